//! Curriculum manager: monotonic difficulty progression driven by recent
//! median fitness.

use std::collections::VecDeque;

use log::info;

use crate::schema::{CurriculumStage, EnvOverrides};

/// Walks an ordered list of difficulty stages. Advancement happens only at
/// generation boundaries, only forward, and only when the median aggregate
/// fitness over the stage's recent window clears its threshold.
#[derive(Debug)]
pub struct CurriculumManager {
    stages: Vec<CurriculumStage>,
    current: usize,
    window: VecDeque<f32>,
}

impl CurriculumManager {
    pub fn new(stages: Vec<CurriculumStage>) -> Self {
        Self {
            stages,
            current: 0,
            window: VecDeque::new(),
        }
    }

    /// Index of the active stage.
    pub fn stage_index(&self) -> usize {
        self.current
    }

    pub fn stage_name(&self) -> Option<&str> {
        self.stages.get(self.current).map(|s| s.name.as_str())
    }

    /// Overrides of the active stage; defaults when no curriculum is set.
    pub fn overrides(&self) -> EnvOverrides {
        self.stages
            .get(self.current)
            .map(|s| s.overrides.clone())
            .unwrap_or_default()
    }

    /// Record one generation's mean fitness and advance if the stage
    /// predicate holds. Returns true when the stage changed; the caller
    /// re-evaluates under the new overrides from the next generation on.
    pub fn observe(&mut self, mean_fitness: f32) -> bool {
        let Some(stage) = self.stages.get(self.current) else {
            return false;
        };
        if self.current + 1 >= self.stages.len() {
            // Final stage never advances.
            return false;
        }

        self.window.push_back(mean_fitness);
        while self.window.len() > stage.window.max(1) {
            self.window.pop_front();
        }
        if self.window.len() < stage.window.max(1) {
            return false;
        }

        let mut sorted: Vec<f32> = self.window.iter().copied().collect();
        sorted.sort_by(f32::total_cmp);
        let median = sorted[sorted.len() / 2];
        if median >= stage.advance_above {
            let from = stage.name.clone();
            self.current += 1;
            self.window.clear();
            info!(
                "curriculum advanced from '{}' to '{}' (median {:.3})",
                from,
                self.stages[self.current].name,
                median
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> Vec<CurriculumStage> {
        vec![
            CurriculumStage {
                name: "easy".into(),
                overrides: EnvOverrides {
                    hazard_rate: 0.5,
                    hazard_speed: 0.5,
                    opponent_speed: 0.5,
                },
                advance_above: 10.0,
                window: 3,
            },
            CurriculumStage {
                name: "hard".into(),
                overrides: EnvOverrides::default(),
                advance_above: f32::INFINITY,
                window: 3,
            },
        ]
    }

    #[test]
    fn test_advances_on_median_over_window() {
        let mut curriculum = CurriculumManager::new(stages());
        assert!(!curriculum.observe(20.0));
        assert!(!curriculum.observe(20.0));
        // Median of [20, 20, 20] clears 10.0.
        assert!(curriculum.observe(20.0));
        assert_eq!(curriculum.stage_index(), 1);
        assert_eq!(curriculum.stage_name(), Some("hard"));
    }

    #[test]
    fn test_single_spike_does_not_advance() {
        let mut curriculum = CurriculumManager::new(stages());
        curriculum.observe(1.0);
        curriculum.observe(100.0);
        // Median of [1, 100, 1] is 1.0: stays.
        assert!(!curriculum.observe(1.0));
        assert_eq!(curriculum.stage_index(), 0);
    }

    #[test]
    fn test_final_stage_is_terminal() {
        let mut curriculum = CurriculumManager::new(stages());
        for _ in 0..3 {
            curriculum.observe(100.0);
        }
        assert_eq!(curriculum.stage_index(), 1);
        for _ in 0..10 {
            assert!(!curriculum.observe(f32::MAX));
        }
        assert_eq!(curriculum.stage_index(), 1);
    }

    #[test]
    fn test_empty_curriculum_uses_defaults() {
        let mut curriculum = CurriculumManager::new(Vec::new());
        assert!(!curriculum.observe(100.0));
        assert_eq!(curriculum.stage_index(), 0);
        assert_eq!(curriculum.overrides(), EnvOverrides::default());
    }
}
