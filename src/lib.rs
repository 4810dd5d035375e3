//! Evotrek - evolutionary training orchestrator for neural-network agents.
//!
//! The crate evolves populations of small neural controllers against a
//! tick-driven episode environment. Five population algorithms share one
//! engine interface: a standard genetic algorithm, NEAT (topology
//! evolution), an NSGA-II multi-objective overlay, a MAP-Elites
//! quality-diversity archive, and competitive co-evolution of two
//! populations. Around the engines sit a slot-based evaluation scheduler,
//! a curriculum manager, run statistics and lineage tracking, and JSON
//! persistence (snapshots, an elite reservoir shared across runs, a NEAT
//! migration pool, and a polled metrics file).
//!
//! # Architecture
//!
//! - [`schema`] - serde-backed configuration, genome, and telemetry types.
//! - [`engine`] - the algorithms and the training machinery around them.
//! - [`arena`] - a small deterministic built-in environment used by the CLI
//!   and the test suite; production evaluators implement
//!   [`engine::Environment`] instead.
//!
//! # Example
//!
//! ```no_run
//! use evotrek::arena::DodgeArena;
//! use evotrek::engine::Trainer;
//! use evotrek::schema::TrainingConfig;
//!
//! let config = TrainingConfig::example();
//! let mut trainer = Trainer::new(config, DodgeArena::default()).unwrap();
//! let history = trainer.run().unwrap();
//! println!("stopped after {} generations", history.generations());
//! ```

pub mod arena;
pub mod engine;
pub mod schema;
