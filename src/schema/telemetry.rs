//! Telemetry records and run history.
//!
//! `GenerationMetrics` is the externally polled progress record: the trainer
//! rewrites one JSON file per generation (write temp + rename, so a poller
//! never reads a torn file). `RunHistory` accumulates the per-generation
//! series in memory for the final report.

use serde::{Deserialize, Serialize};

/// Snapshot of training progress after one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub generation: usize,
    pub best_fitness: f32,
    pub avg_fitness: f32,
    pub min_fitness: f32,
    pub fitness_std_dev: f32,
    /// Best fitness seen over the whole run, not just this generation.
    pub all_time_best: f32,
    pub generations_without_improvement: usize,
    /// Index of the active curriculum stage.
    pub curriculum_stage: usize,
    /// Set on the final record, whatever the stop reason.
    pub training_complete: bool,
    /// NEAT only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species_count: Option<usize>,
    /// MAP-Elites only: occupied cells / total cells.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_elites_coverage: Option<f32>,
    /// NSGA-II only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pareto_front_size: Option<usize>,
}

impl GenerationMetrics {
    pub fn new(generation: usize) -> Self {
        Self {
            generation,
            best_fitness: f32::NEG_INFINITY,
            avg_fitness: 0.0,
            min_fitness: f32::INFINITY,
            fitness_std_dev: 0.0,
            all_time_best: f32::NEG_INFINITY,
            generations_without_improvement: 0,
            curriculum_stage: 0,
            training_complete: false,
            species_count: None,
            map_elites_coverage: None,
            pareto_front_size: None,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Reached the configured generation budget.
    MaxGenerations,
    /// All-time best fitness reached the configured target.
    TargetFitness,
    /// No mean-fitness improvement for the configured number of
    /// generations. A success path: the run converged.
    Stagnation,
    /// External cancellation. In-flight episode results are discarded.
    Cancelled,
}

/// Per-generation series plus final outcome, returned by the trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunHistory {
    pub best_fitness: Vec<f32>,
    pub avg_fitness: Vec<f32>,
    pub fitness_std_dev: Vec<f32>,
    /// (child id, parent ids) edges recorded as offspring are created.
    pub lineage: Vec<(u64, Vec<u64>)>,
    pub stop_reason: Option<StopReason>,
}

impl RunHistory {
    pub fn record(&mut self, metrics: &GenerationMetrics) {
        self.best_fitness.push(metrics.best_fitness);
        self.avg_fitness.push(metrics.avg_fitness);
        self.fitness_std_dev.push(metrics.fitness_std_dev);
    }

    pub fn generations(&self) -> usize {
        self.best_fitness.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_omitted() {
        let metrics = GenerationMetrics::new(3);
        let json = serde_json::to_string(&metrics).unwrap();
        assert!(!json.contains("species_count"));
        assert!(!json.contains("map_elites_coverage"));
        assert!(!json.contains("pareto_front_size"));
    }

    #[test]
    fn test_history_record() {
        let mut history = RunHistory::default();
        let mut metrics = GenerationMetrics::new(0);
        metrics.best_fitness = 5.0;
        metrics.avg_fitness = 2.0;
        history.record(&metrics);
        assert_eq!(history.generations(), 1);
        assert_eq!(history.best_fitness, vec![5.0]);
    }
}
