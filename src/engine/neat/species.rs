//! Speciation: grouping graph genomes by compatibility distance and sharing
//! fitness within each group so new topologies get time to mature.

use log::debug;

use crate::engine::population::Population;
use crate::schema::{CompatibilityConfig, Genome};

use super::genome::compatibility_distance;

/// One species: a representative genome and the member indices assigned to
/// it this generation.
#[derive(Debug, Clone)]
pub struct Species {
    pub id: u32,
    pub representative: Genome,
    pub members: Vec<usize>,
    pub best_fitness: f32,
    /// Generations since `best_fitness` last improved.
    pub stagnation: usize,
}

/// The species list plus the adaptive compatibility threshold.
#[derive(Debug, Clone, Default)]
pub struct SpeciesSet {
    pub species: Vec<Species>,
    next_species_id: u32,
}

impl SpeciesSet {
    /// Assign every individual to the first species whose representative is
    /// within `threshold`, creating new species for outliers. Representatives
    /// are refreshed to each species' first assigned member afterwards.
    pub fn speciate(
        &mut self,
        population: &Population,
        config: &CompatibilityConfig,
        threshold: f32,
    ) {
        for species in &mut self.species {
            species.members.clear();
        }

        for (index, individual) in population.individuals.iter().enumerate() {
            let found = self.species.iter_mut().find(|species| {
                compatibility_distance(&individual.genome, &species.representative, config)
                    < threshold
            });
            match found {
                Some(species) => species.members.push(index),
                None => {
                    let id = self.next_species_id;
                    self.next_species_id += 1;
                    self.species.push(Species {
                        id,
                        representative: individual.genome.clone(),
                        members: vec![index],
                        best_fitness: f32::NEG_INFINITY,
                        stagnation: 0,
                    });
                }
            }
        }

        self.species.retain(|species| !species.members.is_empty());
        for species in &mut self.species {
            // First member as next generation's representative keeps the
            // species anchored without an extra RNG draw.
            species.representative = population.individuals[species.members[0]].genome.clone();
        }
    }

    /// Update per-species stagnation counters from raw member fitness.
    pub fn update_stagnation(&mut self, population: &Population) {
        for species in &mut self.species {
            let best = species
                .members
                .iter()
                .map(|&i| population.individuals[i].fitness)
                .fold(f32::NEG_INFINITY, f32::max);
            if best > species.best_fitness {
                species.best_fitness = best;
                species.stagnation = 0;
            } else {
                species.stagnation += 1;
            }
        }
    }

    /// Remove species stagnant past `limit`. The best-performing species is
    /// always kept so the population cannot go extinct.
    pub fn prune_stagnant(&mut self, limit: usize) {
        if self.species.len() <= 1 {
            return;
        }
        let best_id = self
            .species
            .iter()
            .max_by(|a, b| a.best_fitness.total_cmp(&b.best_fitness))
            .map(|s| s.id);
        let before = self.species.len();
        self.species
            .retain(|s| s.stagnation < limit || Some(s.id) == best_id);
        if self.species.len() < before {
            debug!("pruned {} stagnant species", before - self.species.len());
        }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

/// Shared fitness of a member: raw fitness divided by its species size.
pub fn shared_fitness(raw: f32, species_size: usize) -> f32 {
    raw / species_size.max(1) as f32
}

/// Offspring quota per species, proportional to its total shared fitness,
/// corrected so the quotas sum exactly to `population_size`. Fitness is
/// shifted to be non-negative first so negative scores cannot invert the
/// proportions.
pub fn offspring_quotas(
    species: &[Species],
    population: &Population,
    population_size: usize,
) -> Vec<usize> {
    if species.is_empty() {
        return Vec::new();
    }

    let min_fitness = population
        .individuals
        .iter()
        .map(|ind| ind.fitness)
        .fold(f32::INFINITY, f32::min)
        .min(0.0);

    let totals: Vec<f32> = species
        .iter()
        .map(|s| {
            s.members
                .iter()
                .map(|&i| {
                    shared_fitness(
                        population.individuals[i].fitness - min_fitness,
                        s.members.len(),
                    )
                })
                .sum::<f32>()
        })
        .collect();
    let grand_total: f32 = totals.iter().sum();

    let mut quotas: Vec<usize> = if grand_total <= f32::EPSILON {
        // All equal (or all zero): split evenly.
        species.iter().map(|_| population_size / species.len()).collect()
    } else {
        totals
            .iter()
            .map(|t| ((t / grand_total) * population_size as f32).floor() as usize)
            .collect()
    };

    // Distribute the rounding remainder to the fittest species first.
    let mut assigned: usize = quotas.iter().sum();
    let mut order: Vec<usize> = (0..species.len()).collect();
    order.sort_by(|&a, &b| species[b].best_fitness.total_cmp(&species[a].best_fitness));
    let mut cursor = 0;
    while assigned < population_size {
        quotas[order[cursor % order.len()]] += 1;
        assigned += 1;
        cursor += 1;
    }

    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::neat::genome::{minimal_genome, InnovationContext};
    use crate::engine::rng::EvoRng;

    fn graph_population(count: usize, fitnesses: &[f32]) -> Population {
        let mut ctx = InnovationContext::default();
        let mut rng = EvoRng::new(23);
        let mut population = Population::default();
        for i in 0..count {
            let genome = minimal_genome(2, 1, &mut ctx, &mut rng);
            population.spawn(genome, 0, Vec::new());
            population.individuals[i].fitness = fitnesses[i];
            population.individuals[i].evaluated = true;
        }
        population
    }

    #[test]
    fn test_identical_genomes_share_species() {
        let mut population = graph_population(4, &[1.0, 2.0, 3.0, 4.0]);
        // Force all genomes identical: zero distance, one species.
        let template = population.individuals[0].genome.clone();
        for ind in &mut population.individuals {
            ind.genome = template.clone();
        }
        let mut set = SpeciesSet::default();
        set.speciate(&population, &CompatibilityConfig::default(), 3.0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.species[0].members.len(), 4);
    }

    #[test]
    fn test_shared_fitness_divides_by_size() {
        assert_eq!(shared_fitness(12.0, 4), 3.0);
        assert_eq!(shared_fitness(12.0, 0), 12.0);
    }

    #[test]
    fn test_quotas_sum_to_population_size() {
        let population = graph_population(6, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut set = SpeciesSet::default();
        set.speciate(&population, &CompatibilityConfig::default(), 0.01);
        set.update_stagnation(&population);
        let quotas = offspring_quotas(&set.species, &population, 6);
        assert_eq!(quotas.iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_prune_keeps_best_species() {
        let population = graph_population(2, &[1.0, 9.0]);
        let mut set = SpeciesSet::default();
        set.speciate(&population, &CompatibilityConfig::default(), 0.0001);
        set.update_stagnation(&population);
        for species in &mut set.species {
            species.stagnation = 100;
        }
        set.prune_stagnant(15);
        assert_eq!(set.len(), 1);
        assert_eq!(set.species[0].best_fitness, 9.0);
    }
}
