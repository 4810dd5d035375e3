//! Evolution engines and the training machinery around them.
//!
//! Each population algorithm implements the [`Engine`] trait: the trainer
//! asks it for genomes, hands back aggregated episode results, and tells it
//! to advance one generation. Engines never evaluate anything themselves;
//! evaluation belongs to the scheduler.

pub mod coevolution;
pub mod curriculum;
pub mod map_elites;
pub mod neat;
pub mod nsga2;
pub mod persistence;
pub mod population;
pub mod rng;
pub mod scheduler;
pub mod standard;
pub mod stats;
pub mod trainer;

use serde::{Deserialize, Serialize};

use crate::schema::{AlgorithmConfig, Architecture, ConfigError, Genome, TrainingConfig};

pub use coevolution::{
    CoevolutionCoordinator, DuelOutcome, HallOfFame, Matchup, OpponentSource,
};
pub use curriculum::CurriculumManager;
pub use map_elites::MapElitesEngine;
pub use neat::NeatEngine;
pub use nsga2::Nsga2Engine;
pub use persistence::{EliteReservoir, MigrationPool, PersistError, Persistence};
pub use population::{Individual, Population};
pub use rng::EvoRng;
pub use scheduler::{
    Environment, Episode, EpisodeOutcome, EpisodeRequest, EpisodeStatus, EvalScheduler,
    SeedEvents, TerminalReason,
};
pub use standard::StandardEngine;
pub use stats::StatsTracker;
pub use trainer::{Trainer, TrainerError};

/// Aggregated result of evaluating one individual for one generation
/// (episode results averaged across seeds).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    /// Scalar fitness. For NSGA-II populations this is derived from the
    /// objectives and used only for reporting.
    pub fitness: f32,
    /// Per-objective scores, all maximized. Empty for scalar algorithms.
    pub objectives: Vec<f32>,
    /// 2-D behavior descriptor in [0, 1]^2, present when the environment
    /// reports one. Required by MAP-Elites.
    pub behavior: Option<[f32; 2]>,
}

impl AggregateResult {
    pub fn scalar(fitness: f32) -> Self {
        Self {
            fitness,
            objectives: Vec::new(),
            behavior: None,
        }
    }
}

/// What `advance_generation` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolveOutcome {
    /// A new generation was produced; the generation counter advanced.
    Advanced,
    /// The regression guard restored the previous parents and re-evolved
    /// them. The generation counter did not advance; the new population must
    /// be re-evaluated under the same generation number.
    RolledBack,
}

/// Per-generation statistics an engine reports after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub best_fitness: f32,
    pub avg_fitness: f32,
    pub min_fitness: f32,
    pub fitness_std_dev: f32,
    pub species_count: Option<usize>,
    pub archive_coverage: Option<f32>,
    pub pareto_front_size: Option<usize>,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            best_fitness: f32::NEG_INFINITY,
            avg_fitness: 0.0,
            min_fitness: f32::INFINITY,
            fitness_std_dev: 0.0,
            species_count: None,
            archive_coverage: None,
            pareto_front_size: None,
        }
    }
}

/// Serialized engine state, enough to resume a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub generation: usize,
    pub next_id: u64,
    pub individuals: Vec<IndividualSnapshot>,
    /// Present only for NEAT populations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neat: Option<NeatState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualSnapshot {
    pub id: u64,
    pub genome: Genome,
    pub fitness: f32,
    /// Behavior descriptor, kept so archive-based engines can re-bin elites
    /// on restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<[f32; 2]>,
}

/// NEAT bookkeeping that must survive a snapshot: innovation and node
/// counters plus the adaptive speciation threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatState {
    pub next_innovation: u32,
    pub next_node_id: u32,
    pub compatibility_threshold: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Snapshot genome representation does not match this engine")]
    RepresentationMismatch,
    #[error("Snapshot genome shape does not match the configured architecture")]
    ArchitectureMismatch,
    #[error("Snapshot population is empty")]
    EmptySnapshot,
}

/// Validate a snapshot for a dense-genome engine: non-empty, dense only, and
/// every weight vector shaped for `arch`. A well-formed JSON file can still
/// carry truncated weights; restoring it would panic deep in the forward
/// pass instead of falling back to a fresh population.
pub(crate) fn check_dense_snapshot(
    snapshot: &PopulationSnapshot,
    arch: Architecture,
) -> Result<(), EngineError> {
    if snapshot.individuals.is_empty() {
        return Err(EngineError::EmptySnapshot);
    }
    for ind in &snapshot.individuals {
        match &ind.genome {
            Genome::Graph { .. } => return Err(EngineError::RepresentationMismatch),
            Genome::Dense { arch: got, weights } => {
                if *got != arch || weights.len() != arch.weight_count() {
                    return Err(EngineError::ArchitectureMismatch);
                }
            }
        }
    }
    Ok(())
}

/// A population algorithm. One generation proceeds as: the trainer reads
/// `population_size` genomes via `genome`, evaluates them, calls
/// `assign_result` for each (re-assignment overwrites silently), then calls
/// `advance_generation`.
pub trait Engine {
    fn population_size(&self) -> usize;

    /// Genome of the individual at `index`.
    fn genome(&self, index: usize) -> &Genome;

    /// Stable id of the individual at `index`.
    fn individual_id(&self, index: usize) -> u64;

    /// Store the aggregated evaluation for the individual at `index`.
    fn assign_result(&mut self, index: usize, result: AggregateResult);

    /// Produce the next generation from the current evaluated population.
    fn advance_generation(&mut self) -> EvolveOutcome;

    fn generation(&self) -> usize;

    /// Statistics over the current evaluated population.
    fn stats(&self) -> EngineStats;

    /// Best genome of the current population with its fitness.
    fn best(&self) -> Option<(Genome, f32)>;

    /// Replace the worst current individual with `genome` (elite reservoir
    /// and migration-pool injection).
    fn inject(&mut self, genome: Genome);

    fn snapshot(&self) -> PopulationSnapshot;

    fn restore(&mut self, snapshot: PopulationSnapshot) -> Result<(), EngineError>;

    /// Lineage edges (child id, parent ids) created by the most recent
    /// `advance_generation`.
    fn recent_lineage(&self) -> &[(u64, Vec<u64>)];
}

/// Construct the engine named by the configuration. Co-evolution is not an
/// [`Engine`]; the trainer builds a [`CoevolutionCoordinator`] for it instead.
pub fn build_engine(
    config: &TrainingConfig,
    rng: &mut EvoRng,
) -> Result<Box<dyn Engine>, ConfigError> {
    config.validate()?;
    let population = &config.population;
    Ok(match &config.algorithm {
        AlgorithmConfig::Standard(ga) => {
            Box::new(StandardEngine::new(ga.clone(), population.clone(), rng.fork()))
        }
        AlgorithmConfig::Neat(neat) => {
            Box::new(NeatEngine::new(neat.clone(), population.clone(), rng.fork()))
        }
        AlgorithmConfig::Nsga2(nsga2) => {
            Box::new(Nsga2Engine::new(nsga2.clone(), population.clone(), rng.fork()))
        }
        AlgorithmConfig::MapElites(me) => {
            Box::new(MapElitesEngine::new(me.clone(), population.clone(), rng.fork()))
        }
        AlgorithmConfig::Coevolution(_) => {
            return Err(ConfigError::IncompatibleAlgorithms(
                "co-evolution runs through the coordinator, not a single engine".into(),
            ));
        }
    })
}

pub(crate) fn fitness_stats(fitnesses: &[f32]) -> EngineStats {
    let mut stats = EngineStats::default();
    if fitnesses.is_empty() {
        return stats;
    }
    let n = fitnesses.len() as f32;
    let mut sum = 0.0;
    for &f in fitnesses {
        stats.best_fitness = stats.best_fitness.max(f);
        stats.min_fitness = stats.min_fitness.min(f);
        sum += f;
    }
    stats.avg_fitness = sum / n;
    let variance = fitnesses
        .iter()
        .map(|f| (f - stats.avg_fitness).powi(2))
        .sum::<f32>()
        / n;
    stats.fitness_std_dev = variance.sqrt();
    stats
}
