//! MAP-Elites: a quality-diversity archive over a 2-D behavior descriptor.
//!
//! Each grid cell keeps the single best genome whose behavior falls into it.
//! New candidate batches are bred from elites drawn uniformly across the
//! occupied cells, so exploration pressure comes from the archive's spread
//! rather than from fitness alone.

use log::warn;

use crate::schema::{Architecture, Genome, MapElitesConfig, PopulationConfig, Representation};

use super::population::{mutate_weights, two_point_crossover, Population};
use super::rng::EvoRng;
use super::{
    check_dense_snapshot, fitness_stats, AggregateResult, Engine, EngineError, EngineStats,
    EvolveOutcome, IndividualSnapshot, PopulationSnapshot,
};

#[derive(Debug, Clone)]
struct Elite {
    id: u64,
    genome: Genome,
    fitness: f32,
    behavior: [f32; 2],
}

pub struct MapElitesEngine {
    config: MapElitesConfig,
    rng: EvoRng,
    arch: Architecture,
    cells: Vec<Option<Elite>>,
    /// The candidate batch currently out for evaluation.
    current: Population,
    generation: usize,
    missing_behavior_warned: bool,
    lineage: Vec<(u64, Vec<u64>)>,
}

impl MapElitesEngine {
    pub fn new(config: MapElitesConfig, population: PopulationConfig, mut rng: EvoRng) -> Self {
        debug_assert_eq!(population.representation, Representation::Dense);
        let current = Population::random_dense(population.size, population.architecture, &mut rng);
        let cell_count = config.grid.0 * config.grid.1;
        Self {
            config,
            rng,
            arch: population.architecture,
            cells: vec![None; cell_count],
            current,
            generation: 0,
            missing_behavior_warned: false,
            lineage: Vec::new(),
        }
    }

    /// Map a behavior descriptor to a cell index. Descriptors are clamped
    /// into [0, 1]^2 so out-of-range behavior lands in an edge cell.
    fn cell_index(&self, behavior: [f32; 2]) -> usize {
        let (w, h) = self.config.grid;
        let x = behavior[0].clamp(0.0, 1.0);
        let y = behavior[1].clamp(0.0, 1.0);
        let ix = ((x * w as f32) as usize).min(w - 1);
        let iy = ((y * h as f32) as usize).min(h - 1);
        iy * w + ix
    }

    /// Install `candidate` in its cell only if the cell is empty or the
    /// candidate's fitness is strictly better. Cell fitness never decreases.
    fn try_insert(&mut self, candidate: Elite) {
        let index = self.cell_index(candidate.behavior);
        match &self.cells[index] {
            Some(incumbent) if incumbent.fitness >= candidate.fitness => {}
            _ => self.cells[index] = Some(candidate),
        }
    }

    fn occupied(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn coverage(&self) -> f32 {
        self.occupied().len() as f32 / self.cells.len() as f32
    }
}

impl Engine for MapElitesEngine {
    fn population_size(&self) -> usize {
        self.current.len()
    }

    fn genome(&self, index: usize) -> &Genome {
        &self.current.individuals[index].genome
    }

    fn individual_id(&self, index: usize) -> u64 {
        self.current.individuals[index].id
    }

    fn assign_result(&mut self, index: usize, result: AggregateResult) {
        self.current.individuals[index].apply(result);
    }

    fn advance_generation(&mut self) -> EvolveOutcome {
        let size = self.current.len();

        let mut inserts = Vec::new();
        for ind in &self.current.individuals {
            if !ind.evaluated {
                continue;
            }
            match ind.behavior {
                Some(behavior) => inserts.push(Elite {
                    id: ind.id,
                    genome: ind.genome.clone(),
                    fitness: ind.fitness,
                    behavior,
                }),
                None if !self.missing_behavior_warned => {
                    warn!("evaluation reported no behavior descriptor; archive not updated");
                    self.missing_behavior_warned = true;
                }
                None => {}
            }
        }
        for elite in inserts {
            self.try_insert(elite);
        }

        let occupied = self.occupied();
        let mut next = Population::default();
        next.set_next_id(self.current.next_id());
        self.lineage.clear();

        while next.len() < size {
            if occupied.is_empty() {
                // Nothing archived yet: keep exploring at random.
                let genome = self.rng.random_dense(self.arch);
                next.spawn(genome, self.generation + 1, Vec::new());
                continue;
            }
            let Some(a) = self.cells[occupied[self.rng.index(occupied.len())]].clone() else {
                continue;
            };
            let Genome::Dense { weights: wa, .. } = &a.genome else {
                continue;
            };
            let mut parent_ids = vec![a.id];
            let mut weights = wa.clone();
            if occupied.len() > 1 && self.rng.chance(self.config.crossover_rate) {
                let pick = occupied[self.rng.index(occupied.len())];
                if let Some(b) = self.cells[pick].clone() {
                    if let (Genome::Dense { weights: wb, .. }, true) = (&b.genome, b.id != a.id) {
                        weights = two_point_crossover(wa, wb, &mut self.rng);
                        parent_ids.push(b.id);
                    }
                }
            }
            mutate_weights(
                &mut weights,
                self.config.mutation_rate,
                self.config.mutation_strength,
                &mut self.rng,
            );
            let id = next.spawn(
                Genome::Dense {
                    arch: self.arch,
                    weights,
                },
                self.generation + 1,
                parent_ids.clone(),
            );
            self.lineage.push((id, parent_ids));
        }

        self.current = next;
        self.generation += 1;
        EvolveOutcome::Advanced
    }

    fn generation(&self) -> usize {
        self.generation
    }

    fn stats(&self) -> EngineStats {
        let mut stats = fitness_stats(&self.current.fitnesses());
        stats.archive_coverage = Some(self.coverage());
        stats
    }

    fn best(&self) -> Option<(Genome, f32)> {
        self.cells
            .iter()
            .flatten()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .map(|elite| (elite.genome.clone(), elite.fitness))
            .or_else(|| {
                self.current.best_index().map(|i| {
                    let ind = &self.current.individuals[i];
                    (ind.genome.clone(), ind.fitness)
                })
            })
    }

    fn inject(&mut self, genome: Genome) {
        self.current.replace_worst(genome, self.generation);
    }

    fn snapshot(&self) -> PopulationSnapshot {
        // The archive is the state worth keeping; the candidate batch is
        // disposable.
        let individuals = self
            .cells
            .iter()
            .flatten()
            .map(|elite| IndividualSnapshot {
                id: elite.id,
                genome: elite.genome.clone(),
                fitness: elite.fitness,
                behavior: Some(elite.behavior),
            })
            .collect();
        PopulationSnapshot {
            generation: self.generation,
            next_id: self.current.next_id(),
            individuals,
            neat: None,
        }
    }

    fn restore(&mut self, snapshot: PopulationSnapshot) -> Result<(), EngineError> {
        check_dense_snapshot(&snapshot, self.arch)?;

        for cell in &mut self.cells {
            *cell = None;
        }
        let mut seeds = Vec::new();
        for ind in snapshot.individuals {
            if let Some(behavior) = ind.behavior {
                seeds.push(ind.genome.clone());
                self.try_insert(Elite {
                    id: ind.id,
                    genome: ind.genome,
                    fitness: ind.fitness,
                    behavior,
                });
            } else {
                seeds.push(ind.genome);
            }
        }

        // Rebuild the candidate batch from the restored elites.
        let size = self.current.len();
        let mut current = Population::default();
        current.set_next_id(snapshot.next_id);
        for i in 0..size {
            let genome = seeds[i % seeds.len()].clone();
            current.spawn(genome, snapshot.generation, Vec::new());
        }
        self.current = current;
        self.generation = snapshot.generation;
        Ok(())
    }

    fn recent_lineage(&self) -> &[(u64, Vec<u64>)] {
        &self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(grid: (usize, usize), size: usize) -> MapElitesEngine {
        let config = MapElitesConfig {
            grid,
            ..Default::default()
        };
        let population = PopulationConfig {
            size,
            representation: Representation::Dense,
            architecture: Architecture {
                inputs: 2,
                hidden: 3,
                outputs: 1,
            },
        };
        MapElitesEngine::new(config, population, EvoRng::new(61))
    }

    fn result(fitness: f32, behavior: [f32; 2]) -> AggregateResult {
        AggregateResult {
            fitness,
            objectives: Vec::new(),
            behavior: Some(behavior),
        }
    }

    #[test]
    fn test_cell_fitness_never_decreases() {
        let mut engine = engine((5, 5), 2);
        // Both candidates land in the same cell; the weaker one arrives second.
        engine.assign_result(0, result(100.0, [0.5, 0.7]));
        engine.assign_result(1, result(50.0, [0.5, 0.7]));
        engine.advance_generation();

        let index = engine.cell_index([0.5, 0.7]);
        assert_eq!(engine.cells[index].as_ref().unwrap().fitness, 100.0);

        // A later 50 must not displace the 100 either.
        engine.assign_result(0, result(50.0, [0.5, 0.7]));
        engine.assign_result(1, result(50.0, [0.5, 0.7]));
        engine.advance_generation();
        assert_eq!(engine.cells[index].as_ref().unwrap().fitness, 100.0);
    }

    #[test]
    fn test_behavior_clamped_to_edge_cells() {
        let engine = engine((4, 4), 2);
        assert_eq!(engine.cell_index([-1.0, -1.0]), 0);
        assert_eq!(engine.cell_index([2.0, 2.0]), 15);
        assert_eq!(engine.cell_index([1.0, 0.0]), 3);
    }

    #[test]
    fn test_coverage_grows_monotonically() {
        let mut engine = engine((4, 4), 4);
        engine.assign_result(0, result(1.0, [0.1, 0.1]));
        engine.assign_result(1, result(1.0, [0.9, 0.9]));
        engine.assign_result(2, result(1.0, [0.1, 0.9]));
        engine.assign_result(3, result(1.0, [0.9, 0.1]));
        engine.advance_generation();
        assert_eq!(engine.coverage(), 4.0 / 16.0);

        // Same cells again: coverage unchanged, never reduced.
        engine.assign_result(0, result(0.5, [0.1, 0.1]));
        engine.advance_generation();
        assert_eq!(engine.coverage(), 4.0 / 16.0);
    }

    #[test]
    fn test_snapshot_restores_archive() {
        let mut engine = engine((4, 4), 2);
        engine.assign_result(0, result(7.0, [0.2, 0.2]));
        engine.assign_result(1, result(3.0, [0.8, 0.8]));
        engine.advance_generation();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.individuals.len(), 2);

        let mut restored = engine_fresh();
        restored.restore(snapshot).unwrap();
        assert_eq!(restored.occupied().len(), 2);
        assert_eq!(restored.best().unwrap().1, 7.0);
    }

    #[test]
    fn test_restore_rejects_truncated_weights() {
        let mut engine = engine((4, 4), 2);
        engine.assign_result(0, result(7.0, [0.2, 0.2]));
        engine.advance_generation();
        let mut snapshot = engine.snapshot();
        if let Genome::Dense { weights, .. } = &mut snapshot.individuals[0].genome {
            weights.pop();
        }
        assert!(matches!(
            engine_fresh().restore(snapshot),
            Err(EngineError::ArchitectureMismatch)
        ));
    }

    fn engine_fresh() -> MapElitesEngine {
        engine((4, 4), 2)
    }
}
