//! Run-level statistics: all-time best tracking, stagnation counting, and
//! lineage recording.

use crate::schema::{GenerationMetrics, Genome, RunHistory, StopReason};

use super::EngineStats;

/// Accumulates per-generation statistics across a run. The engines track
/// their own internal stagnation; this tracker owns the run-level view the
/// stop conditions and telemetry are fed from.
#[derive(Debug, Default)]
pub struct StatsTracker {
    all_time_best: f32,
    best_genome: Option<Genome>,
    stagnation: usize,
    history: RunHistory,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            all_time_best: f32::NEG_INFINITY,
            best_genome: None,
            stagnation: 0,
            history: RunHistory::default(),
        }
    }

    /// Fold one evaluated generation into the run statistics and produce its
    /// telemetry record.
    pub fn record(
        &mut self,
        generation: usize,
        stats: &EngineStats,
        best: Option<(Genome, f32)>,
        curriculum_stage: usize,
        lineage: &[(u64, Vec<u64>)],
    ) -> GenerationMetrics {
        if let Some((genome, fitness)) = best {
            if fitness > self.all_time_best {
                self.all_time_best = fitness;
                self.best_genome = Some(genome);
                self.stagnation = 0;
            } else {
                self.stagnation += 1;
            }
        } else {
            self.stagnation += 1;
        }

        for edge in lineage {
            self.history.lineage.push(edge.clone());
        }

        let mut metrics = GenerationMetrics::new(generation);
        metrics.best_fitness = stats.best_fitness;
        metrics.avg_fitness = stats.avg_fitness;
        metrics.min_fitness = stats.min_fitness;
        metrics.fitness_std_dev = stats.fitness_std_dev;
        metrics.all_time_best = self.all_time_best;
        metrics.generations_without_improvement = self.stagnation;
        metrics.curriculum_stage = curriculum_stage;
        metrics.species_count = stats.species_count;
        metrics.map_elites_coverage = stats.archive_coverage;
        metrics.pareto_front_size = stats.pareto_front_size;

        self.history.record(&metrics);
        metrics
    }

    pub fn all_time_best(&self) -> f32 {
        self.all_time_best
    }

    pub fn best_genome(&self) -> Option<&Genome> {
        self.best_genome.as_ref()
    }

    pub fn generations_without_improvement(&self) -> usize {
        self.stagnation
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn finish(mut self, reason: StopReason) -> RunHistory {
        self.history.stop_reason = Some(reason);
        self.history
    }
}
