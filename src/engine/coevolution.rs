//! Competitive co-evolution: a player population and an opponent population
//! evolved against each other, with a small Hall of Fame of past champion
//! opponents to break intransitive chase cycles.

use log::{debug, info};

use crate::schema::{CoevolutionConfig, Genome, OpponentFitnessWeights, PopulationConfig};

use super::rng::EvoRng;
use super::standard::StandardEngine;
use super::{AggregateResult, Engine, EngineStats, EvolveOutcome};

pub const HALL_OF_FAME_CAPACITY: usize = 5;

/// Raw statistics from one player-versus-opponent episode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DuelOutcome {
    /// The player's own fitness for this episode.
    pub player_score: f32,
    /// Damage the opponent inflicted on the player.
    pub damage: f32,
    /// Time-averaged proximity pressure in [0, 1].
    pub pressure: f32,
    /// Seconds the player survived.
    pub survival_seconds: f32,
    /// Direction reversals the player was forced into.
    pub reversals: f32,
}

/// Weighted scalar opponent fitness: reward damage and sustained pressure,
/// penalize letting the player survive, and credit forcing reactions.
pub fn opponent_fitness(outcome: &DuelOutcome, weights: &OpponentFitnessWeights) -> f32 {
    weights.damage * outcome.damage + weights.pressure * outcome.pressure
        - weights.survival_penalty * outcome.survival_seconds
        + weights.reversal_bonus * outcome.reversals
}

#[derive(Debug, Clone)]
struct HofEntry {
    genome: Genome,
    fitness: f32,
    generation: usize,
}

/// Archive of past champion opponents, capped at five, best first.
#[derive(Debug, Clone, Default)]
pub struct HallOfFame {
    entries: Vec<HofEntry>,
}

impl HallOfFame {
    pub fn insert(&mut self, genome: Genome, fitness: f32, generation: usize) {
        self.entries.push(HofEntry {
            genome,
            fitness,
            generation,
        });
        // Best first; among equals the newer champion stays, so stale
        // entries age out.
        self.entries.sort_by(|a, b| {
            b.fitness
                .total_cmp(&a.fitness)
                .then(b.generation.cmp(&a.generation))
        });
        self.entries.truncate(HALL_OF_FAME_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn genome(&self, index: usize) -> &Genome {
        &self.entries[index].genome
    }

    pub fn fitnesses(&self) -> Vec<f32> {
        self.entries.iter().map(|e| e.fitness).collect()
    }
}

/// Which genome the player (or opponent) faces in a duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentSource {
    /// Index into the live opponent population.
    Live(usize),
    /// Index into the Hall of Fame.
    HallOfFame(usize),
}

/// One scheduled duel. `credit_player`/`credit_opponent` say whose fitness
/// this duel contributes to; on Hall-of-Fame generations player-side and
/// opponent-side duels are scheduled separately.
#[derive(Debug, Clone, Copy)]
pub struct Matchup {
    pub player: usize,
    pub opponent: OpponentSource,
    pub credit_player: bool,
    pub credit_opponent: Option<usize>,
}

/// Owns both engines exclusively. Nothing else mutates either population
/// while a co-evolution run is active.
pub struct CoevolutionCoordinator {
    config: CoevolutionConfig,
    rng: EvoRng,
    players: StandardEngine,
    opponents: StandardEngine,
    hall_of_fame: HallOfFame,
    generation: usize,
    player_totals: Vec<(f32, usize)>,
    opponent_totals: Vec<(f32, usize)>,
    /// Best live opponents of the current generation, harvested into the
    /// Hall of Fame at the boundary.
    opponent_best: Vec<(usize, f32)>,
}

impl CoevolutionCoordinator {
    pub fn new(config: CoevolutionConfig, population: PopulationConfig, mut rng: EvoRng) -> Self {
        let mut opponent_population = population.clone();
        if let Some(arch) = config.opponent_architecture {
            opponent_population.architecture = arch;
        }
        let players = StandardEngine::new(config.player.clone(), population.clone(), rng.fork());
        let opponents =
            StandardEngine::new(config.opponent.clone(), opponent_population, rng.fork());
        let size = population.size;
        Self {
            config,
            rng,
            players,
            opponents,
            hall_of_fame: HallOfFame::default(),
            generation: 0,
            player_totals: vec![(0.0, 0); size],
            opponent_totals: vec![(0.0, 0); size],
            opponent_best: Vec::new(),
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn player_genome(&self, index: usize) -> &Genome {
        self.players.genome(index)
    }

    pub fn player_id(&self, index: usize) -> u64 {
        self.players.individual_id(index)
    }

    pub fn opponent_genome(&self, source: OpponentSource) -> &Genome {
        match source {
            OpponentSource::Live(i) => self.opponents.genome(i),
            OpponentSource::HallOfFame(i) => self.hall_of_fame.genome(i),
        }
    }

    fn is_hof_generation(&self) -> bool {
        !self.hall_of_fame.is_empty()
            && self.config.hall_of_fame_interval > 0
            && self.generation > 0
            && self.generation % self.config.hall_of_fame_interval == 0
    }

    /// Schedule this generation's duels. Normally each player is paired with
    /// one uniformly drawn live opponent and the duel credits both sides. On
    /// Hall-of-Fame generations players face archived champions while the
    /// live opponents duel randomly drawn players for their own credit.
    pub fn matchups(&mut self) -> Vec<Matchup> {
        let players = self.players.population_size();
        let opponents = self.opponents.population_size();
        for slot in &mut self.player_totals {
            *slot = (0.0, 0);
        }
        for slot in &mut self.opponent_totals {
            *slot = (0.0, 0);
        }

        if self.is_hof_generation() {
            debug!("generation {}: evaluating against hall of fame", self.generation);
            let mut duels = Vec::with_capacity(players + opponents);
            for player in 0..players {
                let champion = self.rng.index(self.hall_of_fame.len());
                duels.push(Matchup {
                    player,
                    opponent: OpponentSource::HallOfFame(champion),
                    credit_player: true,
                    credit_opponent: None,
                });
            }
            for opponent in 0..opponents {
                duels.push(Matchup {
                    player: self.rng.index(players),
                    opponent: OpponentSource::Live(opponent),
                    credit_player: false,
                    credit_opponent: Some(opponent),
                });
            }
            duels
        } else {
            (0..players)
                .map(|player| {
                    let opponent = self.rng.index(opponents);
                    Matchup {
                        player,
                        opponent: OpponentSource::Live(opponent),
                        credit_player: true,
                        credit_opponent: Some(opponent),
                    }
                })
                .collect()
        }
    }

    /// Feed one finished duel back into the per-side accumulators.
    pub fn record_duel(&mut self, matchup: &Matchup, outcome: &DuelOutcome) {
        if matchup.credit_player {
            let (sum, count) = &mut self.player_totals[matchup.player];
            *sum += outcome.player_score;
            *count += 1;
        }
        if let Some(opponent) = matchup.credit_opponent {
            let score = opponent_fitness(outcome, &self.config.opponent_fitness);
            let (sum, count) = &mut self.opponent_totals[opponent];
            *sum += score;
            *count += 1;
        }
    }

    /// Assign the accumulated duel means to both populations and harvest
    /// champions into the Hall of Fame. Called once all duels are in, before
    /// statistics are read.
    pub fn commit_results(&mut self) {
        for (i, &(sum, count)) in self.player_totals.iter().enumerate() {
            if count > 0 {
                self.players
                    .assign_result(i, AggregateResult::scalar(sum / count as f32));
            }
        }
        self.opponent_best.clear();
        for (i, &(sum, count)) in self.opponent_totals.iter().enumerate() {
            if count > 0 {
                let fitness = sum / count as f32;
                self.opponents.assign_result(i, AggregateResult::scalar(fitness));
                self.opponent_best.push((i, fitness));
            }
        }

        self.opponent_best
            .sort_by(|a, b| b.1.total_cmp(&a.1));
        for &(index, fitness) in self.opponent_best.iter().take(HALL_OF_FAME_CAPACITY) {
            self.hall_of_fame
                .insert(self.opponents.genome(index).clone(), fitness, self.generation);
        }
    }

    /// Evolve both sides. A rollback on either engine repeats the whole
    /// duel generation.
    pub fn evolve(&mut self) -> EvolveOutcome {
        let player_outcome = self.players.advance_generation();
        let opponent_outcome = self.opponents.advance_generation();
        if player_outcome == EvolveOutcome::RolledBack
            || opponent_outcome == EvolveOutcome::RolledBack
        {
            info!("co-evolution generation {} rolled back", self.generation);
            return EvolveOutcome::RolledBack;
        }
        self.generation += 1;
        EvolveOutcome::Advanced
    }

    pub fn population_size(&self) -> usize {
        self.players.population_size()
    }

    /// Player-side statistics, reported as the run's progress.
    pub fn stats(&self) -> EngineStats {
        self.players.stats()
    }

    pub fn best(&self) -> Option<(Genome, f32)> {
        self.players.best()
    }

    pub fn recent_lineage(&self) -> &[(u64, Vec<u64>)] {
        self.players.recent_lineage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Architecture, GaConfig, Representation};

    fn coordinator(size: usize, hof_interval: usize) -> CoevolutionCoordinator {
        let config = CoevolutionConfig {
            player: GaConfig {
                elite_count: 1,
                regression_retries: 0,
                ..Default::default()
            },
            opponent: GaConfig {
                elite_count: 1,
                regression_retries: 0,
                ..Default::default()
            },
            hall_of_fame_interval: hof_interval,
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
        CoevolutionCoordinator::new(config, population, EvoRng::new(71))
    }

    fn run_generation(coordinator: &mut CoevolutionCoordinator, score: f32) {
        let duels = coordinator.matchups();
        for matchup in &duels {
            let outcome = DuelOutcome {
                player_score: score + matchup.player as f32,
                damage: 1.0,
                pressure: 0.5,
                survival_seconds: 10.0,
                reversals: 4.0,
            };
            coordinator.record_duel(matchup, &outcome);
        }
        coordinator.commit_results();
        coordinator.evolve();
    }

    #[test]
    fn test_opponent_fitness_combination() {
        let outcome = DuelOutcome {
            player_score: 0.0,
            damage: 2.0,
            pressure: 0.5,
            survival_seconds: 10.0,
            reversals: 4.0,
        };
        let fitness = opponent_fitness(&outcome, &OpponentFitnessWeights::default());
        // 50*2 + 30*0.5 - 2*10 + 0.5*4
        assert!((fitness - 97.0).abs() < 1e-6);
    }

    #[test]
    fn test_hall_of_fame_caps_at_five() {
        let mut hof = HallOfFame::default();
        let genome = Genome::Dense {
            arch: Architecture::default(),
            weights: vec![0.0; Architecture::default().weight_count()],
        };
        for i in 0..10 {
            hof.insert(genome.clone(), i as f32, i);
        }
        assert_eq!(hof.len(), 5);
        // Best first.
        let fitnesses = hof.fitnesses();
        assert_eq!(fitnesses, vec![9.0, 8.0, 7.0, 6.0, 5.0]);
    }

    #[test]
    fn test_live_pairing_credits_both_sides() {
        let mut coordinator = coordinator(4, 0);
        let duels = coordinator.matchups();
        assert_eq!(duels.len(), 4);
        for matchup in &duels {
            assert!(matchup.credit_player);
            assert!(matchup.credit_opponent.is_some());
        }
    }

    #[test]
    fn test_hof_generation_pairs_against_champions() {
        let mut coordinator = coordinator(4, 2);
        run_generation(&mut coordinator, 1.0);
        assert!(!coordinator.hall_of_fame().is_empty());
        run_generation(&mut coordinator, 2.0);
        assert_eq!(coordinator.generation(), 2);

        // Generation 2 is a Hall-of-Fame generation.
        let duels = coordinator.matchups();
        let hof_duels = duels
            .iter()
            .filter(|m| matches!(m.opponent, OpponentSource::HallOfFame(_)))
            .count();
        assert_eq!(hof_duels, 4);
        // Opponent-side duels still happen so the opponents keep evolving.
        assert_eq!(duels.len(), 8);
    }

    #[test]
    fn test_generations_advance() {
        let mut coordinator = coordinator(4, 3);
        for generation in 0..4 {
            run_generation(&mut coordinator, generation as f32);
        }
        assert_eq!(coordinator.generation(), 4);
        assert!(coordinator.best().is_some());
    }
}
