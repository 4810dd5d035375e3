//! Population container and the shared dense-genome variation operators.

use crate::schema::{Architecture, Genome};

use super::rng::EvoRng;
use super::{AggregateResult, IndividualSnapshot};

/// A member of a population.
#[derive(Debug, Clone)]
pub struct Individual {
    /// Unique within the run.
    pub id: u64,
    pub genome: Genome,
    pub fitness: f32,
    /// Per-objective scores for multi-objective selection.
    pub objectives: Vec<f32>,
    /// 2-D behavior descriptor, when the environment reports one.
    pub behavior: Option<[f32; 2]>,
    pub evaluated: bool,
    /// Generation this individual was created in.
    pub generation: usize,
    pub parents: Vec<u64>,
}

impl Individual {
    pub fn new(id: u64, genome: Genome, generation: usize, parents: Vec<u64>) -> Self {
        Self {
            id,
            genome,
            fitness: 0.0,
            objectives: Vec::new(),
            behavior: None,
            evaluated: false,
            generation,
            parents,
        }
    }

    pub fn apply(&mut self, result: AggregateResult) {
        self.fitness = result.fitness;
        self.objectives = result.objectives;
        self.behavior = result.behavior;
        self.evaluated = true;
    }

    pub fn to_snapshot(&self) -> IndividualSnapshot {
        IndividualSnapshot {
            id: self.id,
            genome: self.genome.clone(),
            fitness: self.fitness,
            behavior: self.behavior,
        }
    }
}

/// Individuals plus the id counter they draw from.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub individuals: Vec<Individual>,
    next_id: u64,
}

impl Population {
    /// Fresh population of random dense genomes.
    pub fn random_dense(size: usize, arch: Architecture, rng: &mut EvoRng) -> Self {
        let mut population = Self::default();
        for _ in 0..size {
            let genome = rng.random_dense(arch);
            population.spawn(genome, 0, Vec::new());
        }
        population
    }

    /// Add a new individual and return its id.
    pub fn spawn(&mut self, genome: Genome, generation: usize, parents: Vec<u64>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.individuals
            .push(Individual::new(id, genome, generation, parents));
        id
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn fitnesses(&self) -> Vec<f32> {
        self.individuals.iter().map(|ind| ind.fitness).collect()
    }

    pub fn mean_fitness(&self) -> f32 {
        if self.individuals.is_empty() {
            return 0.0;
        }
        self.fitnesses().iter().sum::<f32>() / self.individuals.len() as f32
    }

    pub fn best_index(&self) -> Option<usize> {
        self.individuals
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.fitness.total_cmp(&b.fitness))
            .map(|(i, _)| i)
    }

    pub fn worst_index(&self) -> Option<usize> {
        self.individuals
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.fitness.total_cmp(&b.fitness))
            .map(|(i, _)| i)
    }

    /// Replace the worst member with `genome`, keeping the member's slot.
    pub fn replace_worst(&mut self, genome: Genome, generation: usize) {
        if let Some(worst) = self.worst_index() {
            let id = self.next_id;
            self.next_id += 1;
            self.individuals[worst] = Individual::new(id, genome, generation, Vec::new());
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn set_next_id(&mut self, next_id: u64) {
        self.next_id = next_id;
    }

    /// Indices sorted by descending fitness.
    pub fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.individuals.len()).collect();
        order.sort_by(|&a, &b| {
            self.individuals[b]
                .fitness
                .total_cmp(&self.individuals[a].fitness)
        });
        order
    }
}

/// Tournament selection: draw `size` members uniformly, return the index of
/// the fittest.
pub fn tournament_select(population: &Population, size: usize, rng: &mut EvoRng) -> usize {
    let n = population.len();
    let mut winner = rng.index(n);
    for _ in 1..size.max(1) {
        let challenger = rng.index(n);
        if population.individuals[challenger].fitness > population.individuals[winner].fitness {
            winner = challenger;
        }
    }
    winner
}

/// Two-point crossover over flat weight vectors: the child takes parent A's
/// weights outside the cut segment and parent B's inside it.
pub fn two_point_crossover(a: &[f32], b: &[f32], rng: &mut EvoRng) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    if n < 2 {
        return a.to_vec();
    }
    let mut p1 = rng.index(n);
    let mut p2 = rng.index(n);
    if p1 > p2 {
        std::mem::swap(&mut p1, &mut p2);
    }
    let mut child = a.to_vec();
    child[p1..p2].copy_from_slice(&b[p1..p2]);
    child
}

/// Per-weight Gaussian mutation. Each weight is perturbed with probability
/// `rate` by a sample from N(0, strength).
pub fn mutate_weights(weights: &mut [f32], rate: f32, strength: f32, rng: &mut EvoRng) {
    for w in weights {
        if rng.chance(rate) {
            *w += rng.gaussian(strength);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Architecture;

    fn small_population(fitnesses: &[f32]) -> Population {
        let arch = Architecture {
            inputs: 1,
            hidden: 1,
            outputs: 1,
        };
        let mut rng = EvoRng::new(0);
        let mut population = Population::random_dense(fitnesses.len(), arch, &mut rng);
        for (ind, &f) in population.individuals.iter_mut().zip(fitnesses) {
            ind.fitness = f;
            ind.evaluated = true;
        }
        population
    }

    #[test]
    fn test_spawn_assigns_unique_ids() {
        let population = small_population(&[1.0, 2.0, 3.0]);
        let ids: Vec<u64> = population.individuals.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(population.next_id(), 3);
    }

    #[test]
    fn test_best_and_worst() {
        let population = small_population(&[3.0, 9.0, 1.0]);
        assert_eq!(population.best_index(), Some(1));
        assert_eq!(population.worst_index(), Some(2));
    }

    #[test]
    fn test_replace_worst_gets_fresh_id() {
        let mut population = small_population(&[3.0, 9.0, 1.0]);
        let genome = population.individuals[0].genome.clone();
        population.replace_worst(genome, 4);
        assert_eq!(population.individuals[2].id, 3);
        assert_eq!(population.individuals[2].generation, 4);
        assert!(!population.individuals[2].evaluated);
    }

    #[test]
    fn test_tournament_prefers_fitter() {
        let population = small_population(&[0.0, 100.0, 0.0, 0.0]);
        let mut rng = EvoRng::new(42);
        let mut wins = 0;
        for _ in 0..200 {
            if tournament_select(&population, 3, &mut rng) == 1 {
                wins += 1;
            }
        }
        // With tournament size 3 over 4 members the best wins most draws.
        assert!(wins > 100);
    }

    #[test]
    fn test_two_point_crossover_segments() {
        let a = vec![0.0; 10];
        let b = vec![1.0; 10];
        let mut rng = EvoRng::new(5);
        let child = two_point_crossover(&a, &b, &mut rng);
        assert_eq!(child.len(), 10);
        // Every weight came from one of the parents.
        assert!(child.iter().all(|&w| w == 0.0 || w == 1.0));
    }

    #[test]
    fn test_mutation_rate_zero_is_identity() {
        let mut weights = vec![0.5; 8];
        let mut rng = EvoRng::new(9);
        mutate_weights(&mut weights, 0.0, 1.0, &mut rng);
        assert_eq!(weights, vec![0.5; 8]);
    }
}
