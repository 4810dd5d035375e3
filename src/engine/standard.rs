//! Fixed-topology genetic algorithm.
//!
//! Elitism, tournament selection, two-point crossover, per-weight Gaussian
//! mutation. Two refinements on top of the textbook loop: mutation strength
//! escalates while the run stagnates, and a bounded regression guard rolls a
//! generation back when its mean fitness falls below its parents' mean.

use log::{debug, info};

use crate::schema::{Architecture, GaConfig, Genome, PopulationConfig, Representation};

use super::population::{
    mutate_weights, tournament_select, two_point_crossover, Individual, Population,
};
use super::rng::EvoRng;
use super::{
    check_dense_snapshot, fitness_stats, AggregateResult, Engine, EngineError, EngineStats,
    EvolveOutcome, PopulationSnapshot,
};

pub struct StandardEngine {
    config: GaConfig,
    rng: EvoRng,
    arch: Architecture,
    population: Population,
    generation: usize,
    all_time_best: f32,
    stagnation: usize,
    /// The evaluated parents of the current population, kept so the
    /// regression guard can restore and re-evolve them.
    guard_parents: Option<Population>,
    /// Mean fitness of those parents.
    prev_mean: Option<f32>,
    retries_left: usize,
    lineage: Vec<(u64, Vec<u64>)>,
}

impl StandardEngine {
    pub fn new(config: GaConfig, population: PopulationConfig, mut rng: EvoRng) -> Self {
        debug_assert_eq!(population.representation, Representation::Dense);
        let retries = config.regression_retries;
        let members = Population::random_dense(population.size, population.architecture, &mut rng);
        Self {
            config,
            rng,
            arch: population.architecture,
            population: members,
            generation: 0,
            all_time_best: f32::NEG_INFINITY,
            stagnation: 0,
            guard_parents: None,
            prev_mean: None,
            retries_left: retries,
            lineage: Vec::new(),
        }
    }

    pub fn all_time_best(&self) -> f32 {
        self.all_time_best
    }

    pub fn generations_without_improvement(&self) -> usize {
        self.stagnation
    }

    /// Mutation strength after adaptive escalation.
    fn effective_strength(&self) -> f32 {
        let adaptive = &self.config.adaptive;
        let over = self
            .stagnation
            .saturating_sub(adaptive.after_stagnant_generations);
        if over == 0 {
            return self.config.mutation_strength;
        }
        (self.config.mutation_strength * adaptive.strength_multiplier.powi(over as i32))
            .min(adaptive.max_strength)
    }

    /// Breed the next population from `parents`. Elites carry over as the
    /// same individuals; the rest are tournament offspring.
    fn breed(&mut self, parents: &Population, strength: f32) -> Population {
        let mut next = Population::default();
        next.set_next_id(parents.next_id());
        self.lineage.clear();

        let ranked = parents.ranked();
        for &i in ranked.iter().take(self.config.elite_count) {
            next.individuals.push(parents.individuals[i].clone());
        }

        while next.len() < parents.len() {
            let a = tournament_select(parents, self.config.tournament_size, &mut self.rng);
            let b = tournament_select(parents, self.config.tournament_size, &mut self.rng);
            let (pa, pb) = (&parents.individuals[a], &parents.individuals[b]);

            let (mut weights, parent_ids) = match (&pa.genome, &pb.genome) {
                (Genome::Dense { weights: wa, .. }, Genome::Dense { weights: wb, .. }) => {
                    if a != b && self.rng.chance(self.config.crossover_rate) {
                        (
                            two_point_crossover(wa, wb, &mut self.rng),
                            vec![pa.id, pb.id],
                        )
                    } else {
                        (wa.clone(), vec![pa.id])
                    }
                }
                // Dense engines never hold graph genomes.
                _ => (Vec::new(), Vec::new()),
            };
            mutate_weights(&mut weights, self.config.mutation_rate, strength, &mut self.rng);

            let arch = match &pa.genome {
                Genome::Dense { arch, .. } => *arch,
                Genome::Graph { .. } => continue,
            };
            let child = Genome::Dense { arch, weights };
            let id = next.spawn(child, self.generation + 1, parent_ids.clone());
            self.lineage.push((id, parent_ids));
        }

        next
    }
}

impl Engine for StandardEngine {
    fn population_size(&self) -> usize {
        self.population.len()
    }

    fn genome(&self, index: usize) -> &Genome {
        &self.population.individuals[index].genome
    }

    fn individual_id(&self, index: usize) -> u64 {
        self.population.individuals[index].id
    }

    fn assign_result(&mut self, index: usize, result: AggregateResult) {
        self.population.individuals[index].apply(result);
    }

    fn advance_generation(&mut self) -> EvolveOutcome {
        let mean = self.population.mean_fitness();

        if let (Some(prev), Some(parents)) = (self.prev_mean, self.guard_parents.as_ref()) {
            if mean < prev && self.retries_left > 0 {
                self.retries_left -= 1;
                info!(
                    "generation {} regressed (mean {:.3} < {:.3}), rolling back ({} retries left)",
                    self.generation, mean, prev, self.retries_left
                );
                let parents = parents.clone();
                let strength = self.effective_strength();
                self.population = self.breed(&parents, strength);
                return EvolveOutcome::RolledBack;
            }
        }

        let best = self
            .population
            .best_index()
            .map(|i| self.population.individuals[i].fitness)
            .unwrap_or(f32::NEG_INFINITY);
        if best > self.all_time_best {
            self.all_time_best = best;
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }

        let strength = self.effective_strength();
        if strength > self.config.mutation_strength {
            debug!(
                "stagnation {}: mutation strength escalated to {:.3}",
                self.stagnation, strength
            );
        }

        let parents = std::mem::take(&mut self.population);
        self.population = self.breed(&parents, strength);
        self.guard_parents = Some(parents);
        self.prev_mean = Some(mean);
        self.retries_left = self.config.regression_retries;
        self.generation += 1;
        EvolveOutcome::Advanced
    }

    fn generation(&self) -> usize {
        self.generation
    }

    fn stats(&self) -> EngineStats {
        fitness_stats(&self.population.fitnesses())
    }

    fn best(&self) -> Option<(Genome, f32)> {
        self.population
            .best_index()
            .map(|i| {
                let ind = &self.population.individuals[i];
                (ind.genome.clone(), ind.fitness)
            })
    }

    fn inject(&mut self, genome: Genome) {
        self.population.replace_worst(genome, self.generation);
    }

    fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            generation: self.generation,
            next_id: self.population.next_id(),
            individuals: self
                .population
                .individuals
                .iter()
                .map(|ind| ind.to_snapshot())
                .collect(),
            neat: None,
        }
    }

    fn restore(&mut self, snapshot: PopulationSnapshot) -> Result<(), EngineError> {
        check_dense_snapshot(&snapshot, self.arch)?;
        let mut population = Population::default();
        for ind in snapshot.individuals {
            let mut member =
                Individual::new(ind.id, ind.genome, snapshot.generation, Vec::new());
            member.fitness = ind.fitness;
            population.individuals.push(member);
        }
        population.set_next_id(snapshot.next_id);
        self.population = population;
        self.generation = snapshot.generation;
        self.guard_parents = None;
        self.prev_mean = None;
        self.retries_left = self.config.regression_retries;
        Ok(())
    }

    fn recent_lineage(&self) -> &[(u64, Vec<u64>)] {
        &self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Architecture;

    fn engine_with(fitnesses: &[f32], config: GaConfig) -> StandardEngine {
        let population = PopulationConfig {
            size: fitnesses.len(),
            representation: Representation::Dense,
            architecture: Architecture {
                inputs: 2,
                hidden: 3,
                outputs: 1,
            },
        };
        let mut engine = StandardEngine::new(config, population, EvoRng::new(11));
        for (i, &f) in fitnesses.iter().enumerate() {
            engine.assign_result(i, AggregateResult::scalar(f));
        }
        engine
    }

    #[test]
    fn test_elites_survive_unchanged() {
        let config = GaConfig {
            elite_count: 2,
            regression_retries: 0,
            ..Default::default()
        };
        let mut engine = engine_with(&[10.0, 5.0, 3.0, 1.0], config);
        let best = engine.genome(0).clone();
        let second = engine.genome(1).clone();

        assert_eq!(engine.advance_generation(), EvolveOutcome::Advanced);
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.genome(0), &best);
        assert_eq!(engine.genome(1), &second);
    }

    #[test]
    fn test_regression_guard_rolls_back_then_gives_up() {
        let config = GaConfig {
            elite_count: 1,
            regression_retries: 1,
            ..Default::default()
        };
        let mut engine = engine_with(&[10.0, 8.0, 6.0, 4.0], config);
        assert_eq!(engine.advance_generation(), EvolveOutcome::Advanced);
        assert_eq!(engine.generation(), 1);

        // New generation evaluates worse than its parents' mean of 7.0.
        for i in 0..4 {
            engine.assign_result(i, AggregateResult::scalar(1.0));
        }
        assert_eq!(engine.advance_generation(), EvolveOutcome::RolledBack);
        assert_eq!(engine.generation(), 1);

        // Still worse after the retry: budget exhausted, advance anyway.
        for i in 0..4 {
            engine.assign_result(i, AggregateResult::scalar(1.0));
        }
        assert_eq!(engine.advance_generation(), EvolveOutcome::Advanced);
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn test_stagnation_counter() {
        let config = GaConfig {
            regression_retries: 0,
            elite_count: 1,
            ..Default::default()
        };
        let mut engine = engine_with(&[5.0, 1.0, 1.0, 1.0], config);
        engine.advance_generation();
        assert_eq!(engine.generations_without_improvement(), 0);

        for _ in 0..3 {
            for i in 0..4 {
                engine.assign_result(i, AggregateResult::scalar(2.0));
            }
            engine.advance_generation();
        }
        assert_eq!(engine.generations_without_improvement(), 3);
        assert_eq!(engine.all_time_best(), 5.0);
    }

    #[test]
    fn test_adaptive_strength_caps() {
        let config = GaConfig {
            mutation_strength: 0.3,
            adaptive: crate::schema::AdaptiveMutation {
                after_stagnant_generations: 0,
                strength_multiplier: 10.0,
                max_strength: 0.9,
            },
            ..Default::default()
        };
        let mut engine = engine_with(&[1.0, 1.0], config);
        engine.stagnation = 5;
        assert_eq!(engine.effective_strength(), 0.9);
    }

    #[test]
    fn test_inject_replaces_worst() {
        let config = GaConfig::default();
        let mut engine = engine_with(&[10.0, 5.0, 1.0], config);
        let arch = Architecture {
            inputs: 2,
            hidden: 3,
            outputs: 1,
        };
        let marker = Genome::Dense {
            arch,
            weights: vec![9.9; arch.weight_count()],
        };
        engine.inject(marker.clone());
        assert_eq!(engine.genome(2), &marker);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let config = GaConfig::default();
        let mut engine = engine_with(&[3.0, 2.0, 1.0], config.clone());
        let snapshot = engine.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: PopulationSnapshot = serde_json::from_str(&json).unwrap();

        let genomes: Vec<Genome> = (0..3).map(|i| engine.genome(i).clone()).collect();
        engine.restore(parsed).unwrap();
        for (i, genome) in genomes.iter().enumerate() {
            assert_eq!(engine.genome(i), genome);
        }
    }

    #[test]
    fn test_restore_rejects_truncated_weights() {
        let mut engine = engine_with(&[3.0, 2.0, 1.0], GaConfig::default());
        let mut snapshot = engine.snapshot();
        // Well-formed JSON can still carry a short weight vector; restoring
        // it must fail instead of panicking later in the forward pass.
        if let Genome::Dense { weights, .. } = &mut snapshot.individuals[0].genome {
            weights.truncate(2);
        }
        assert!(matches!(
            engine.restore(snapshot),
            Err(EngineError::ArchitectureMismatch)
        ));
    }

    #[test]
    fn test_restore_rejects_foreign_architecture() {
        let mut engine = engine_with(&[3.0, 2.0, 1.0], GaConfig::default());
        let mut snapshot = engine.snapshot();
        let arch = Architecture {
            inputs: 4,
            hidden: 8,
            outputs: 2,
        };
        snapshot.individuals[0].genome = Genome::Dense {
            arch,
            weights: vec![0.0; arch.weight_count()],
        };
        assert!(matches!(
            engine.restore(snapshot),
            Err(EngineError::ArchitectureMismatch)
        ));
    }
}
