//! Training configuration types.
//!
//! Everything the orchestrator needs is described by one [`TrainingConfig`]
//! loaded from JSON: which population algorithm to run, population and
//! scheduler sizing, stop conditions, curriculum stages, and persistence
//! locations. `validate()` rejects broken configurations before any
//! generation runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::Architecture;

/// Top-level configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Population algorithm to run.
    pub algorithm: AlgorithmConfig,
    /// Population sizing and controller architecture.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Episode scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Stop conditions.
    #[serde(default)]
    pub stop: StopConfig,
    /// Ordered difficulty stages. Empty means a single implicit stage with
    /// default environment overrides.
    #[serde(default)]
    pub curriculum: Vec<CurriculumStage>,
    /// Snapshot, reservoir, and migration settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Seed for the run RNG. None draws one from entropy.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Worker identity for migration-pool exports. Defaults to the run id.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmConfig::Standard(GaConfig::default()),
            population: PopulationConfig::default(),
            scheduler: SchedulerConfig::default(),
            stop: StopConfig::default(),
            curriculum: Vec::new(),
            persistence: PersistenceConfig::default(),
            random_seed: None,
            worker_id: None,
        }
    }
}

/// Algorithm selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlgorithmConfig {
    /// Fixed-topology genetic algorithm.
    Standard(GaConfig),
    /// Topology-evolving NEAT. Requires graph genomes.
    Neat(NeatConfig),
    /// Multi-objective NSGA-II selection over dense genomes.
    Nsga2(Nsga2Config),
    /// Quality-diversity MAP-Elites archive over dense genomes.
    MapElites(MapElitesConfig),
    /// Competitive co-evolution of two populations.
    Coevolution(CoevolutionConfig),
}

/// Genome representation for the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Representation {
    /// Fixed-architecture weight vector.
    #[default]
    Dense,
    /// NEAT node/connection graph.
    Graph,
}

/// Standard genetic algorithm parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaConfig {
    /// Number of best individuals copied unchanged into the next generation.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Tournament size for parent selection.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Two-point crossover probability.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    /// Per-weight mutation probability.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    /// Standard deviation of Gaussian weight mutation.
    #[serde(default = "default_mutation_strength")]
    pub mutation_strength: f32,
    /// Adaptive mutation escalation under stagnation.
    #[serde(default)]
    pub adaptive: AdaptiveMutation,
    /// Retry budget for the regression guard: when a new generation's mean
    /// fitness drops below the previous one, the pre-evolve population is
    /// restored and re-evolved up to this many times before advancing anyway.
    /// Compensates for evaluation noise but can also mask a genuinely harmful
    /// step; tune with care.
    #[serde(default = "default_regression_retries")]
    pub regression_retries: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            elite_count: default_elite_count(),
            tournament_size: default_tournament_size(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            mutation_strength: default_mutation_strength(),
            adaptive: AdaptiveMutation::default(),
            regression_retries: default_regression_retries(),
        }
    }
}

fn default_elite_count() -> usize {
    10
}
fn default_tournament_size() -> usize {
    3
}
fn default_crossover_rate() -> f32 {
    0.7
}
fn default_mutation_rate() -> f32 {
    0.15
}
fn default_mutation_strength() -> f32 {
    0.3
}
fn default_regression_retries() -> usize {
    2
}

/// Mutation strength escalation after sustained stagnation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveMutation {
    /// Generations without improvement before escalation starts.
    #[serde(default = "default_adaptive_after")]
    pub after_stagnant_generations: usize,
    /// Multiplier applied per stagnant generation past the threshold.
    #[serde(default = "default_adaptive_multiplier")]
    pub strength_multiplier: f32,
    /// Hard cap on escalated strength.
    #[serde(default = "default_adaptive_max")]
    pub max_strength: f32,
}

impl Default for AdaptiveMutation {
    fn default() -> Self {
        Self {
            after_stagnant_generations: default_adaptive_after(),
            strength_multiplier: default_adaptive_multiplier(),
            max_strength: default_adaptive_max(),
        }
    }
}

fn default_adaptive_after() -> usize {
    5
}
fn default_adaptive_multiplier() -> f32 {
    1.3
}
fn default_adaptive_max() -> f32 {
    1.0
}

/// NEAT parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    /// Probability of perturbing connection weights at all.
    #[serde(default = "default_weight_mutation_rate")]
    pub weight_mutation_rate: f32,
    /// Standard deviation of weight perturbation.
    #[serde(default = "default_weight_mutation_strength")]
    pub weight_mutation_strength: f32,
    /// Probability a perturbed weight is replaced outright instead.
    #[serde(default = "default_weight_replace_rate")]
    pub weight_replace_rate: f32,
    /// Probability of an add-connection structural mutation.
    #[serde(default = "default_conn_add_rate")]
    pub conn_add_rate: f32,
    /// Probability of an add-node structural mutation.
    #[serde(default = "default_node_add_rate")]
    pub node_add_rate: f32,
    /// Probability of re-enabling a disabled connection.
    #[serde(default = "default_conn_enable_rate")]
    pub conn_enable_rate: f32,
    /// Probability of disabling an enabled connection.
    #[serde(default = "default_conn_disable_rate")]
    pub conn_disable_rate: f32,
    /// Tournament size for within-species parent selection.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Best genomes of each generation copied unchanged.
    #[serde(default = "default_neat_elites")]
    pub elite_count: usize,
    /// Compatibility distance coefficients and speciation thresholds.
    #[serde(default)]
    pub compatibility: CompatibilityConfig,
    /// Generations without improvement before a species is pruned.
    #[serde(default = "default_species_stagnation")]
    pub species_stagnation_limit: usize,
    /// Run generations during which no species is pruned, shielding new
    /// structural innovations early on.
    #[serde(default = "default_protect_generations")]
    pub protect_generations: usize,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            weight_mutation_rate: default_weight_mutation_rate(),
            weight_mutation_strength: default_weight_mutation_strength(),
            weight_replace_rate: default_weight_replace_rate(),
            conn_add_rate: default_conn_add_rate(),
            node_add_rate: default_node_add_rate(),
            conn_enable_rate: default_conn_enable_rate(),
            conn_disable_rate: default_conn_disable_rate(),
            tournament_size: default_tournament_size(),
            elite_count: default_neat_elites(),
            compatibility: CompatibilityConfig::default(),
            species_stagnation_limit: default_species_stagnation(),
            protect_generations: default_protect_generations(),
        }
    }
}

fn default_weight_mutation_rate() -> f32 {
    0.8
}
fn default_weight_mutation_strength() -> f32 {
    0.5
}
fn default_weight_replace_rate() -> f32 {
    0.1
}
fn default_conn_add_rate() -> f32 {
    0.05
}
fn default_node_add_rate() -> f32 {
    0.03
}
fn default_conn_enable_rate() -> f32 {
    0.01
}
fn default_conn_disable_rate() -> f32 {
    0.01
}
fn default_neat_elites() -> usize {
    1
}
fn default_species_stagnation() -> usize {
    15
}
fn default_protect_generations() -> usize {
    10
}

/// Compatibility distance coefficients and adaptive threshold settings.
///
/// distance = c1 * excess / N + c2 * disjoint / N + c3 * avg_weight_diff,
/// with N = the larger genome's gene count when above `normalize_above`,
/// else 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityConfig {
    #[serde(default = "default_excess_coeff")]
    pub excess_coeff: f32,
    #[serde(default = "default_disjoint_coeff")]
    pub disjoint_coeff: f32,
    #[serde(default = "default_weight_coeff")]
    pub weight_coeff: f32,
    /// Gene count above which distances are normalized by N.
    #[serde(default = "default_normalize_above")]
    pub normalize_above: usize,
    /// Initial speciation threshold.
    #[serde(default = "default_compat_threshold")]
    pub threshold: f32,
    /// Per-generation threshold nudge used to steer species count into the
    /// target band.
    #[serde(default = "default_threshold_step")]
    pub threshold_step: f32,
    /// Target band for species count (inclusive).
    #[serde(default = "default_species_target")]
    pub species_target: (usize, usize),
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            excess_coeff: default_excess_coeff(),
            disjoint_coeff: default_disjoint_coeff(),
            weight_coeff: default_weight_coeff(),
            normalize_above: default_normalize_above(),
            threshold: default_compat_threshold(),
            threshold_step: default_threshold_step(),
            species_target: default_species_target(),
        }
    }
}

fn default_excess_coeff() -> f32 {
    1.0
}
fn default_disjoint_coeff() -> f32 {
    1.0
}
fn default_weight_coeff() -> f32 {
    0.4
}
fn default_normalize_above() -> usize {
    20
}
fn default_compat_threshold() -> f32 {
    3.0
}
fn default_threshold_step() -> f32 {
    0.1
}
fn default_species_target() -> (usize, usize) {
    (4, 12)
}

/// NSGA-II parameters. Selection is multi-objective; reproduction reuses the
/// dense-genome variation operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nsga2Config {
    /// Number of objectives every evaluation must report.
    #[serde(default = "default_objectives")]
    pub objectives: usize,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    #[serde(default = "default_mutation_strength")]
    pub mutation_strength: f32,
}

impl Default for Nsga2Config {
    fn default() -> Self {
        Self {
            objectives: default_objectives(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            mutation_strength: default_mutation_strength(),
        }
    }
}

fn default_objectives() -> usize {
    3
}

/// MAP-Elites parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapElitesConfig {
    /// Grid resolution over the 2-D behavior descriptor.
    #[serde(default = "default_grid")]
    pub grid: (usize, usize),
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    #[serde(default = "default_mutation_strength")]
    pub mutation_strength: f32,
    /// Crossover probability when two occupied cells are drawn.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
}

impl Default for MapElitesConfig {
    fn default() -> Self {
        Self {
            grid: default_grid(),
            mutation_rate: default_mutation_rate(),
            mutation_strength: default_mutation_strength(),
            crossover_rate: default_crossover_rate(),
        }
    }
}

fn default_grid() -> (usize, usize) {
    (20, 20)
}

/// Competitive co-evolution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoevolutionConfig {
    /// GA parameters for the player population.
    #[serde(default)]
    pub player: GaConfig,
    /// GA parameters for the opponent population.
    #[serde(default)]
    pub opponent: GaConfig,
    /// Opponent controller architecture. None reuses the player architecture.
    #[serde(default)]
    pub opponent_architecture: Option<Architecture>,
    /// Every this many generations players are evaluated against the
    /// Hall-of-Fame archive instead of the live opponents, breaking
    /// intransitive cycles.
    #[serde(default = "default_hof_interval")]
    pub hall_of_fame_interval: usize,
    /// Weights of the opponent fitness combination.
    #[serde(default)]
    pub opponent_fitness: OpponentFitnessWeights,
}

impl Default for CoevolutionConfig {
    fn default() -> Self {
        Self {
            player: GaConfig::default(),
            opponent: GaConfig::default(),
            opponent_architecture: None,
            hall_of_fame_interval: default_hof_interval(),
            opponent_fitness: OpponentFitnessWeights::default(),
        }
    }
}

fn default_hof_interval() -> usize {
    5
}

/// Weights combining the raw opponent episode statistics into a scalar
/// fitness: damage inflicted, time-averaged proximity pressure in [0, 1],
/// the player's survival seconds (penalized), and the player's direction
/// reversals (rewarded, since forcing the player to react is progress).
/// The combination itself is the contract; the default weights are
/// empirical and open for tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentFitnessWeights {
    #[serde(default = "default_damage_weight")]
    pub damage: f32,
    #[serde(default = "default_pressure_weight")]
    pub pressure: f32,
    #[serde(default = "default_survival_penalty")]
    pub survival_penalty: f32,
    #[serde(default = "default_reversal_bonus")]
    pub reversal_bonus: f32,
}

impl Default for OpponentFitnessWeights {
    fn default() -> Self {
        Self {
            damage: default_damage_weight(),
            pressure: default_pressure_weight(),
            survival_penalty: default_survival_penalty(),
            reversal_bonus: default_reversal_bonus(),
        }
    }
}

fn default_damage_weight() -> f32 {
    50.0
}
fn default_pressure_weight() -> f32 {
    30.0
}
fn default_survival_penalty() -> f32 {
    2.0
}
fn default_reversal_bonus() -> f32 {
    0.5
}

/// Population sizing and controller shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Genome representation. NEAT requires `Graph`; all other algorithms
    /// require `Dense`.
    #[serde(default)]
    pub representation: Representation,
    /// Architecture for dense genomes; input/output counts for graphs.
    #[serde(default)]
    pub architecture: Architecture,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            representation: Representation::default(),
            architecture: Architecture::default(),
        }
    }
}

fn default_population_size() -> usize {
    50
}

/// Slot-based evaluation scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of concurrently active episode slots.
    #[serde(default = "default_parallel_count")]
    pub parallel_count: usize,
    /// Seeds each individual is evaluated under per generation; results are
    /// averaged.
    #[serde(default = "default_evals_per_individual")]
    pub evals_per_individual: usize,
    /// Episodes exceeding this duration are recorded as timed out, a normal
    /// terminal outcome.
    #[serde(default = "default_max_episode_seconds")]
    pub max_episode_seconds: f32,
    /// Simulated seconds per tick.
    #[serde(default = "default_tick_dt")]
    pub tick_dt: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel_count: default_parallel_count(),
            evals_per_individual: default_evals_per_individual(),
            max_episode_seconds: default_max_episode_seconds(),
            tick_dt: default_tick_dt(),
        }
    }
}

fn default_parallel_count() -> usize {
    10
}
fn default_evals_per_individual() -> usize {
    2
}
fn default_max_episode_seconds() -> f32 {
    30.0
}
fn default_tick_dt() -> f32 {
    1.0 / 30.0
}

/// Stop conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stop early once the all-time best fitness reaches this value.
    #[serde(default)]
    pub target_fitness: Option<f32>,
    /// Generations without mean-fitness improvement before training is
    /// declared complete. This is a success path, not an error.
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: usize,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            target_fitness: None,
            stagnation_limit: default_stagnation_limit(),
        }
    }
}

fn default_max_generations() -> usize {
    50
}
fn default_stagnation_limit() -> usize {
    20
}

/// One difficulty tier. Stages are totally ordered by position in the
/// curriculum list; advancement is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumStage {
    pub name: String,
    /// Environment overrides applied while this stage is active.
    #[serde(default)]
    pub overrides: EnvOverrides,
    /// Advance once the median aggregate fitness over the recent window
    /// exceeds this value.
    pub advance_above: f32,
    /// Window of recent generations the median is taken over.
    #[serde(default = "default_curriculum_window")]
    pub window: usize,
}

fn default_curriculum_window() -> usize {
    5
}

/// Difficulty multipliers handed to the episode environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvOverrides {
    #[serde(default = "default_unit")]
    pub hazard_rate: f32,
    #[serde(default = "default_unit")]
    pub hazard_speed: f32,
    #[serde(default = "default_unit")]
    pub opponent_speed: f32,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self {
            hazard_rate: 1.0,
            hazard_speed: 1.0,
            opponent_speed: 1.0,
        }
    }
}

fn default_unit() -> f32 {
    1.0
}

/// Snapshot, elite reservoir, and migration-pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for population/best snapshots and metrics. None disables
    /// all persistence.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Snapshot every this many generations. 0 disables periodic snapshots.
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,
    /// Elite reservoir settings.
    #[serde(default)]
    pub reservoir: ReservoirConfig,
    /// Cross-run migration pool (NEAT only). None disables migration.
    #[serde(default)]
    pub migration: Option<MigrationConfig>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            save_interval: default_save_interval(),
            reservoir: ReservoirConfig::default(),
            migration: None,
        }
    }
}

fn default_save_interval() -> usize {
    5
}

/// Elite reservoir: the top fraction of a run's final population is kept as
/// independent snapshot files, FIFO-capped, for injection into fresh runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservoirConfig {
    #[serde(default = "default_reservoir_fraction")]
    pub fraction: f32,
    #[serde(default = "default_reservoir_max_files")]
    pub max_files: usize,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            fraction: default_reservoir_fraction(),
            max_files: default_reservoir_max_files(),
        }
    }
}

fn default_reservoir_fraction() -> f32 {
    0.1
}
fn default_reservoir_max_files() -> usize {
    50
}

/// Cross-run migration pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Shared directory workers export their best genomes into.
    pub pool_dir: PathBuf,
    /// Export the local best every this many generations.
    #[serde(default = "default_export_interval")]
    pub export_interval: usize,
    /// Import another worker's best after this many stagnant generations.
    #[serde(default = "default_import_after")]
    pub import_after_stagnant: usize,
}

fn default_export_interval() -> usize {
    5
}
fn default_import_after() -> usize {
    10
}

/// Configuration validation errors. All fatal: rejected before any
/// generation runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("elite_count {elite} exceeds population size {size}")]
    EliteCountExceedsPopulation { elite: usize, size: usize },
    #[error("parallel_count must be at least 1")]
    NoEvalSlots,
    #[error("evals_per_individual must be at least 1")]
    NoEvals,
    #[error("NSGA-II needs at least 2 objectives, got {0}")]
    TooFewObjectives(usize),
    #[error("Incompatible algorithm combination: {0}")]
    IncompatibleAlgorithms(String),
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidRate { name: &'static str, value: f32 },
    #[error("MAP-Elites grid must have at least one cell")]
    EmptyArchiveGrid,
    #[error("Reservoir fraction must be in (0, 1], got {0}")]
    InvalidReservoirFraction(f32),
    #[error("max_episode_seconds and tick_dt must be positive")]
    InvalidEpisodeTiming,
}

impl TrainingConfig {
    /// Validate the configuration. Errors here are fatal and halt startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population.size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.scheduler.parallel_count == 0 {
            return Err(ConfigError::NoEvalSlots);
        }
        if self.scheduler.evals_per_individual == 0 {
            return Err(ConfigError::NoEvals);
        }
        if self.scheduler.max_episode_seconds <= 0.0 || self.scheduler.tick_dt <= 0.0 {
            return Err(ConfigError::InvalidEpisodeTiming);
        }

        let fraction = self.persistence.reservoir.fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidReservoirFraction(fraction));
        }

        let check_rate = |name: &'static str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidRate { name, value })
            }
        };

        let check_ga = |ga: &GaConfig| -> Result<(), ConfigError> {
            if ga.elite_count > self.population.size {
                return Err(ConfigError::EliteCountExceedsPopulation {
                    elite: ga.elite_count,
                    size: self.population.size,
                });
            }
            check_rate("crossover_rate", ga.crossover_rate)?;
            check_rate("mutation_rate", ga.mutation_rate)?;
            Ok(())
        };

        match &self.algorithm {
            AlgorithmConfig::Standard(ga) => {
                self.require_representation(Representation::Dense, "standard GA")?;
                check_ga(ga)?;
            }
            AlgorithmConfig::Neat(neat) => {
                if self.population.representation != Representation::Graph {
                    return Err(ConfigError::IncompatibleAlgorithms(
                        "NEAT requires graph genomes".into(),
                    ));
                }
                check_rate("weight_mutation_rate", neat.weight_mutation_rate)?;
                check_rate("conn_add_rate", neat.conn_add_rate)?;
                check_rate("node_add_rate", neat.node_add_rate)?;
            }
            AlgorithmConfig::Nsga2(nsga2) => {
                self.require_representation(Representation::Dense, "NSGA-II")?;
                if nsga2.objectives < 2 {
                    return Err(ConfigError::TooFewObjectives(nsga2.objectives));
                }
                check_rate("crossover_rate", nsga2.crossover_rate)?;
                check_rate("mutation_rate", nsga2.mutation_rate)?;
            }
            AlgorithmConfig::MapElites(me) => {
                self.require_representation(Representation::Dense, "MAP-Elites")?;
                if me.grid.0 == 0 || me.grid.1 == 0 {
                    return Err(ConfigError::EmptyArchiveGrid);
                }
                check_rate("mutation_rate", me.mutation_rate)?;
                check_rate("crossover_rate", me.crossover_rate)?;
            }
            AlgorithmConfig::Coevolution(co) => {
                self.require_representation(Representation::Dense, "co-evolution")?;
                check_ga(&co.player)?;
                check_ga(&co.opponent)?;
            }
        }

        Ok(())
    }

    fn require_representation(
        &self,
        wanted: Representation,
        algorithm: &str,
    ) -> Result<(), ConfigError> {
        if self.population.representation != wanted {
            return Err(ConfigError::IncompatibleAlgorithms(format!(
                "{algorithm} cannot run on graph genomes; NEAT is the only graph-genome algorithm"
            )));
        }
        Ok(())
    }

    /// A small, fast example configuration, printable with `--example`.
    pub fn example() -> Self {
        Self {
            algorithm: AlgorithmConfig::Standard(GaConfig::default()),
            population: PopulationConfig {
                size: 50,
                representation: Representation::Dense,
                architecture: Architecture {
                    inputs: 6,
                    hidden: 32,
                    outputs: 2,
                },
            },
            curriculum: vec![
                CurriculumStage {
                    name: "warmup".into(),
                    overrides: EnvOverrides {
                        hazard_rate: 0.5,
                        hazard_speed: 0.8,
                        opponent_speed: 0.8,
                    },
                    advance_above: 10.0,
                    window: 5,
                },
                CurriculumStage {
                    name: "full".into(),
                    overrides: EnvOverrides::default(),
                    // Final stage; the threshold is never consulted.
                    advance_above: f32::MAX,
                    window: 5,
                },
            ],
            random_seed: Some(42),
            ..Self::default()
        }
    }
}
