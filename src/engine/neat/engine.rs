//! NEAT population engine: speciated reproduction over graph genomes.

use log::debug;

use crate::schema::{Genome, NeatConfig, PopulationConfig, Representation};

use crate::engine::population::Population;
use crate::engine::rng::EvoRng;
use crate::engine::{
    fitness_stats, AggregateResult, Engine, EngineError, EngineStats, EvolveOutcome, NeatState,
    PopulationSnapshot,
};

use super::genome::{crossover, minimal_genome, mutate, InnovationContext};
use super::species::{offspring_quotas, SpeciesSet};

pub struct NeatEngine {
    config: NeatConfig,
    rng: EvoRng,
    population: Population,
    generation: usize,
    ctx: InnovationContext,
    species: SpeciesSet,
    threshold: f32,
    lineage: Vec<(u64, Vec<u64>)>,
}

impl NeatEngine {
    pub fn new(config: NeatConfig, population: PopulationConfig, mut rng: EvoRng) -> Self {
        debug_assert_eq!(population.representation, Representation::Graph);
        let mut ctx = InnovationContext::default();
        let mut members = Population::default();
        for _ in 0..population.size {
            let genome = minimal_genome(
                population.architecture.inputs,
                population.architecture.outputs,
                &mut ctx,
                &mut rng,
            );
            members.spawn(genome, 0, Vec::new());
        }
        let threshold = config.compatibility.threshold;
        Self {
            config,
            rng,
            population: members,
            generation: 0,
            ctx,
            species: SpeciesSet::default(),
            threshold,
            lineage: Vec::new(),
        }
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    pub fn compatibility_threshold(&self) -> f32 {
        self.threshold
    }

    /// Nudge the threshold toward the configured species-count band.
    fn adapt_threshold(&mut self) {
        let (low, high) = self.config.compatibility.species_target;
        let step = self.config.compatibility.threshold_step;
        if self.species.len() > high {
            self.threshold += step;
        } else if self.species.len() < low {
            self.threshold = (self.threshold - step).max(0.1);
        }
    }

    /// Tournament over member indices using raw fitness.
    fn select_member(&mut self, members: &[usize]) -> usize {
        let mut winner = members[self.rng.index(members.len())];
        for _ in 1..self.config.tournament_size.max(1) {
            let challenger = members[self.rng.index(members.len())];
            if self.population.individuals[challenger].fitness
                > self.population.individuals[winner].fitness
            {
                winner = challenger;
            }
        }
        winner
    }
}

impl Engine for NeatEngine {
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
        let size = self.population.len();

        self.species.speciate(
            &self.population,
            &self.config.compatibility,
            self.threshold,
        );
        self.species.update_stagnation(&self.population);
        // Young runs keep every species alive so fresh topologies are not
        // culled before they can pay off.
        if self.generation >= self.config.protect_generations {
            self.species
                .prune_stagnant(self.config.species_stagnation_limit);
        }
        self.adapt_threshold();
        debug!(
            "generation {}: {} species, threshold {:.2}",
            self.generation,
            self.species.len(),
            self.threshold
        );

        let mut next = Population::default();
        next.set_next_id(self.population.next_id());
        self.lineage.clear();

        // Global elites carry over as the same individuals.
        let ranked = self.population.ranked();
        for &i in ranked.iter().take(self.config.elite_count.min(size)) {
            next.individuals.push(self.population.individuals[i].clone());
        }

        let offspring_total = size - next.len();
        let quotas = offspring_quotas(&self.species.species, &self.population, offspring_total);

        let species_members: Vec<Vec<usize>> = self
            .species
            .species
            .iter()
            .map(|s| s.members.clone())
            .collect();

        for (members, quota) in species_members.iter().zip(&quotas) {
            for _ in 0..*quota {
                let a = self.select_member(members);
                let child = if members.len() > 1 {
                    let mut b = self.select_member(members);
                    if b == a {
                        b = members[self.rng.index(members.len())];
                    }
                    let (pa, pb) = (
                        &self.population.individuals[a],
                        &self.population.individuals[b],
                    );
                    let (fitter, other) = if pa.fitness >= pb.fitness {
                        (pa, pb)
                    } else {
                        (pb, pa)
                    };
                    let mut genome = crossover(&fitter.genome, &other.genome, &mut self.rng);
                    mutate(&mut genome, &self.config, &mut self.ctx, &mut self.rng);
                    (genome, vec![fitter.id, other.id])
                } else {
                    let parent = &self.population.individuals[a];
                    let mut genome = parent.genome.clone();
                    mutate(&mut genome, &self.config, &mut self.ctx, &mut self.rng);
                    (genome, vec![parent.id])
                };
                let (genome, parents) = child;
                let id = next.spawn(genome, self.generation + 1, parents.clone());
                self.lineage.push((id, parents));
            }
        }

        // Quota rounding against a pruned species list can leave holes; fill
        // them with mutated clones of the best genome.
        while next.len() < size {
            if let Some(best) = self.population.best_index() {
                let parent_id = self.population.individuals[best].id;
                let mut genome = self.population.individuals[best].genome.clone();
                mutate(&mut genome, &self.config, &mut self.ctx, &mut self.rng);
                let id = next.spawn(genome, self.generation + 1, vec![parent_id]);
                self.lineage.push((id, vec![parent_id]));
            } else {
                break;
            }
        }

        self.population = next;
        self.generation += 1;
        EvolveOutcome::Advanced
    }

    fn generation(&self) -> usize {
        self.generation
    }

    fn stats(&self) -> EngineStats {
        let mut stats = fitness_stats(&self.population.fitnesses());
        stats.species_count = Some(self.species.len().max(1));
        stats
    }

    fn best(&self) -> Option<(Genome, f32)> {
        self.population.best_index().map(|i| {
            let ind = &self.population.individuals[i];
            (ind.genome.clone(), ind.fitness)
        })
    }

    fn inject(&mut self, genome: Genome) {
        if matches!(genome, Genome::Graph { .. }) {
            self.population.replace_worst(genome, self.generation);
        }
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
            neat: Some(NeatState {
                next_innovation: self.ctx.next_innovation(),
                next_node_id: self.ctx.next_node_id(),
                compatibility_threshold: self.threshold,
            }),
        }
    }

    fn restore(&mut self, snapshot: PopulationSnapshot) -> Result<(), EngineError> {
        if snapshot.individuals.is_empty() {
            return Err(EngineError::EmptySnapshot);
        }
        if snapshot
            .individuals
            .iter()
            .any(|ind| matches!(ind.genome, Genome::Dense { .. }))
        {
            return Err(EngineError::RepresentationMismatch);
        }
        let neat = snapshot.neat.ok_or(EngineError::RepresentationMismatch)?;

        let mut population = Population::default();
        for ind in snapshot.individuals {
            let mut member = crate::engine::population::Individual::new(
                ind.id,
                ind.genome,
                snapshot.generation,
                Vec::new(),
            );
            member.fitness = ind.fitness;
            population.individuals.push(member);
        }
        population.set_next_id(snapshot.next_id);

        self.population = population;
        self.generation = snapshot.generation;
        self.ctx = InnovationContext::new(neat.next_innovation, neat.next_node_id);
        self.threshold = neat.compatibility_threshold;
        self.species = SpeciesSet::default();
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

    fn engine(size: usize) -> NeatEngine {
        let population = PopulationConfig {
            size,
            representation: Representation::Graph,
            architecture: Architecture {
                inputs: 3,
                hidden: 0,
                outputs: 2,
            },
        };
        NeatEngine::new(NeatConfig::default(), population, EvoRng::new(31))
    }

    fn evaluate_all(engine: &mut NeatEngine, base: f32) {
        for i in 0..engine.population_size() {
            engine.assign_result(i, AggregateResult::scalar(base + i as f32));
        }
    }

    #[test]
    fn test_population_size_is_stable() {
        let mut engine = engine(12);
        for generation in 0..5 {
            evaluate_all(&mut engine, generation as f32);
            assert_eq!(engine.advance_generation(), EvolveOutcome::Advanced);
            assert_eq!(engine.population_size(), 12);
        }
        assert_eq!(engine.generation(), 5);
    }

    #[test]
    fn test_best_elite_survives() {
        let mut engine = engine(8);
        evaluate_all(&mut engine, 0.0);
        let (best, _) = engine.best().unwrap();
        engine.advance_generation();
        assert_eq!(engine.genome(0), &best);
    }

    #[test]
    fn test_snapshot_preserves_innovation_counters() {
        let mut engine = engine(6);
        for generation in 0..4 {
            evaluate_all(&mut engine, generation as f32);
            engine.advance_generation();
        }
        let snapshot = engine.snapshot();
        let neat = snapshot.neat.clone().unwrap();
        assert!(neat.next_innovation >= 6);

        let mut restored = engine_fresh();
        restored.restore(snapshot).unwrap();
        assert_eq!(restored.generation(), 4);
        assert_eq!(restored.ctx.next_innovation(), neat.next_innovation);
        assert_eq!(restored.ctx.next_node_id(), neat.next_node_id);
    }

    fn engine_fresh() -> NeatEngine {
        engine(6)
    }

    #[test]
    fn test_restore_rejects_dense_snapshot() {
        let mut neat_engine = engine(4);
        let mut snapshot = neat_engine.snapshot();
        snapshot.individuals[0].genome = Genome::Dense {
            arch: Architecture::default(),
            weights: vec![0.0; Architecture::default().weight_count()],
        };
        assert!(matches!(
            neat_engine.restore(snapshot),
            Err(EngineError::RepresentationMismatch)
        ));
    }
}
