//! NSGA-II: multi-objective selection by non-dominated sorting and crowding
//! distance, layered over the shared dense-genome variation operators.

use crate::schema::{Architecture, Genome, Nsga2Config, PopulationConfig, Representation};

use super::population::{mutate_weights, two_point_crossover, Individual, Population};
use super::rng::EvoRng;
use super::{
    check_dense_snapshot, fitness_stats, AggregateResult, Engine, EngineError, EngineStats,
    EvolveOutcome, PopulationSnapshot,
};

/// `a` dominates `b` when it is at least as good in every objective and
/// strictly better in at least one. All objectives are maximized.
pub fn dominates(a: &[f32], b: &[f32]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Fast non-dominated sort: partition indices into fronts, front 0 first.
pub fn non_dominated_fronts(objectives: &[Vec<f32>]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(&objectives[i], &objectives[j]) {
                dominated_by[i].push(j);
                domination_count[j] += 1;
            } else if dominates(&objectives[j], &objectives[i]) {
                dominated_by[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(std::mem::replace(&mut current, next));
    }
    fronts
}

/// Crowding distance within one front. Boundary individuals get infinity so
/// extreme trade-offs are always preserved.
pub fn crowding_distances(front: &[usize], objectives: &[Vec<f32>]) -> Vec<f32> {
    let mut distance = vec![0.0f32; front.len()];
    if front.len() <= 2 {
        for d in &mut distance {
            *d = f32::INFINITY;
        }
        return distance;
    }

    let objective_count = objectives[front[0]].len();
    for m in 0..objective_count {
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| objectives[front[a]][m].total_cmp(&objectives[front[b]][m]));

        distance[order[0]] = f32::INFINITY;
        distance[*order.last().unwrap_or(&0)] = f32::INFINITY;

        let low = objectives[front[order[0]]][m];
        let high = objectives[front[*order.last().unwrap_or(&0)]][m];
        let range = high - low;
        if range <= f32::EPSILON {
            continue;
        }
        for w in order.windows(3) {
            let prev = objectives[front[w[0]]][m];
            let next = objectives[front[w[2]]][m];
            if distance[w[1]].is_finite() {
                distance[w[1]] += (next - prev) / range;
            }
        }
    }
    distance
}

pub struct Nsga2Engine {
    config: Nsga2Config,
    rng: EvoRng,
    arch: Architecture,
    /// The candidates currently out for evaluation.
    current: Population,
    /// Evaluated survivors of the previous environmental selection, with
    /// their (rank, crowding) selection keys.
    parents: Vec<Individual>,
    parent_keys: Vec<(usize, f32)>,
    generation: usize,
    front0_size: usize,
    lineage: Vec<(u64, Vec<u64>)>,
}

impl Nsga2Engine {
    pub fn new(config: Nsga2Config, population: PopulationConfig, mut rng: EvoRng) -> Self {
        debug_assert_eq!(population.representation, Representation::Dense);
        let current = Population::random_dense(population.size, population.architecture, &mut rng);
        Self {
            config,
            rng,
            arch: population.architecture,
            current,
            parents: Vec::new(),
            parent_keys: Vec::new(),
            generation: 0,
            front0_size: 0,
            lineage: Vec::new(),
        }
    }

    fn objectives_of(individual: &Individual) -> Vec<f32> {
        if individual.objectives.is_empty() {
            vec![individual.fitness]
        } else {
            individual.objectives.clone()
        }
    }

    /// Binary tournament on (rank, crowding): lower rank wins, ties go to
    /// the more isolated individual.
    fn tournament(&mut self) -> usize {
        let a = self.rng.index(self.parents.len());
        let b = self.rng.index(self.parents.len());
        let (rank_a, crowd_a) = self.parent_keys[a];
        let (rank_b, crowd_b) = self.parent_keys[b];
        if rank_a < rank_b || (rank_a == rank_b && crowd_a > crowd_b) {
            a
        } else {
            b
        }
    }
}

impl Engine for Nsga2Engine {
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

        // Environmental selection runs over parents plus offspring (mu+lambda),
        // so good survivors are never lost to one bad generation.
        let mut pool: Vec<Individual> = self.parents.drain(..).collect();
        pool.extend(self.current.individuals.drain(..));
        let objectives: Vec<Vec<f32>> = pool.iter().map(Self::objectives_of).collect();

        let fronts = non_dominated_fronts(&objectives);
        self.front0_size = fronts.first().map(|f| f.len()).unwrap_or(0);

        let mut survivors: Vec<usize> = Vec::with_capacity(size);
        let mut keys: Vec<(usize, f32)> = Vec::with_capacity(size);
        for (rank, front) in fronts.iter().enumerate() {
            let crowding = crowding_distances(front, &objectives);
            if survivors.len() + front.len() <= size {
                for (pos, &i) in front.iter().enumerate() {
                    survivors.push(i);
                    keys.push((rank, crowding[pos]));
                }
            } else {
                let mut order: Vec<usize> = (0..front.len()).collect();
                order.sort_by(|&a, &b| crowding[b].total_cmp(&crowding[a]));
                for &pos in order.iter().take(size - survivors.len()) {
                    survivors.push(front[pos]);
                    keys.push((rank, crowding[pos]));
                }
                break;
            }
        }

        let next_id = self.current.next_id();
        let mut parents = Vec::with_capacity(survivors.len());
        for &i in &survivors {
            parents.push(pool[i].clone());
        }
        self.parents = parents;
        self.parent_keys = keys;

        // Breed the next candidate set from the survivors.
        let mut next = Population::default();
        next.set_next_id(next_id);
        self.lineage.clear();
        while next.len() < size {
            let a = self.tournament();
            let b = self.tournament();
            let (pa, pb) = (&self.parents[a], &self.parents[b]);
            let (mut weights, parent_ids, arch) = match (&pa.genome, &pb.genome) {
                (
                    Genome::Dense { arch, weights: wa },
                    Genome::Dense { weights: wb, .. },
                ) => {
                    if a != b && self.rng.chance(self.config.crossover_rate) {
                        (
                            two_point_crossover(wa, wb, &mut self.rng),
                            vec![pa.id, pb.id],
                            *arch,
                        )
                    } else {
                        (wa.clone(), vec![pa.id], *arch)
                    }
                }
                _ => continue,
            };
            mutate_weights(
                &mut weights,
                self.config.mutation_rate,
                self.config.mutation_strength,
                &mut self.rng,
            );
            let id = next.spawn(
                Genome::Dense { arch, weights },
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
        stats.pareto_front_size = Some(self.front0_size);
        stats
    }

    fn best(&self) -> Option<(Genome, f32)> {
        // Highest scalar fitness among survivors, falling back to the
        // current candidates before the first selection.
        let source = if self.parents.is_empty() {
            &self.current.individuals
        } else {
            &self.parents
        };
        source
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .map(|ind| (ind.genome.clone(), ind.fitness))
    }

    fn inject(&mut self, genome: Genome) {
        self.current.replace_worst(genome, self.generation);
    }

    fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            generation: self.generation,
            next_id: self.current.next_id(),
            individuals: self
                .current
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
        self.current = population;
        self.generation = snapshot.generation;
        self.parents.clear();
        self.parent_keys.clear();
        Ok(())
    }

    fn recent_lineage(&self) -> &[(u64, Vec<u64>)] {
        &self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dominates() {
        assert!(dominates(&[2.0, 2.0], &[1.0, 2.0]));
        assert!(!dominates(&[2.0, 1.0], &[1.0, 2.0]));
        assert!(!dominates(&[1.0, 1.0], &[1.0, 1.0]));
    }

    #[test]
    fn test_front_construction() {
        let objectives = vec![
            vec![3.0, 3.0], // front 0
            vec![1.0, 1.0], // dominated by everyone above it
            vec![2.0, 4.0], // front 0 (trade-off with [3,3])
            vec![2.0, 2.0], // front 1
        ];
        let fronts = non_dominated_fronts(&objectives);
        assert_eq!(fronts[0], vec![0, 2]);
        assert_eq!(fronts[1], vec![3]);
        assert_eq!(fronts[2], vec![1]);
    }

    #[test]
    fn test_boundary_crowding_is_infinite() {
        let objectives = vec![
            vec![1.0, 4.0],
            vec![2.0, 3.0],
            vec![3.0, 2.0],
            vec![4.0, 1.0],
        ];
        let front = vec![0, 1, 2, 3];
        let crowding = crowding_distances(&front, &objectives);
        assert!(crowding[0].is_infinite());
        assert!(crowding[3].is_infinite());
        assert!(crowding[1].is_finite());
        assert!(crowding[2].is_finite());
    }

    #[test]
    fn test_generation_cycle_keeps_size() {
        let config = Nsga2Config::default();
        let population = PopulationConfig {
            size: 10,
            representation: Representation::Dense,
            architecture: crate::schema::Architecture {
                inputs: 2,
                hidden: 4,
                outputs: 1,
            },
        };
        let mut engine = Nsga2Engine::new(config, population, EvoRng::new(41));
        for generation in 0..3 {
            for i in 0..10 {
                let x = (i + generation) as f32;
                engine.assign_result(
                    i,
                    AggregateResult {
                        fitness: x,
                        objectives: vec![x, 10.0 - x, x * 0.5],
                        behavior: None,
                    },
                );
            }
            assert_eq!(engine.advance_generation(), EvolveOutcome::Advanced);
            assert_eq!(engine.population_size(), 10);
        }
        assert!(engine.stats().pareto_front_size.unwrap() >= 1);
    }

    #[test]
    fn test_restore_rejects_truncated_weights() {
        let population = PopulationConfig {
            size: 4,
            representation: Representation::Dense,
            architecture: Architecture {
                inputs: 2,
                hidden: 4,
                outputs: 1,
            },
        };
        let mut engine = Nsga2Engine::new(Nsga2Config::default(), population, EvoRng::new(7));
        let mut snapshot = engine.snapshot();
        if let Genome::Dense { weights, .. } = &mut snapshot.individuals[0].genome {
            weights.truncate(1);
        }
        assert!(matches!(
            engine.restore(snapshot),
            Err(EngineError::ArchitectureMismatch)
        ));
    }

    proptest! {
        /// No member of front 0 may dominate another member of front 0.
        #[test]
        fn prop_front0_mutually_non_dominated(
            raw in prop::collection::vec(prop::collection::vec(0.0f32..10.0, 3), 2..30)
        ) {
            let fronts = non_dominated_fronts(&raw);
            let front0 = &fronts[0];
            for &i in front0 {
                for &j in front0 {
                    prop_assert!(!dominates(&raw[i], &raw[j]));
                }
            }
        }
    }
}
