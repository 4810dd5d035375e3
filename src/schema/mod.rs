//! Serializable types: configuration, genomes, and telemetry.

mod config;
mod genome;
mod telemetry;

pub use config::{
    AdaptiveMutation, AlgorithmConfig, CoevolutionConfig, CompatibilityConfig, ConfigError,
    CurriculumStage, EnvOverrides, GaConfig, MapElitesConfig, MigrationConfig, NeatConfig,
    Nsga2Config, OpponentFitnessWeights, PersistenceConfig, PopulationConfig, Representation,
    ReservoirConfig, SchedulerConfig, StopConfig, TrainingConfig,
};
pub use genome::{Architecture, ConnectionGene, Genome, NodeGene, NodeKind};
pub use telemetry::{GenerationMetrics, RunHistory, StopReason};
