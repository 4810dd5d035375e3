//! NEAT: topology-evolving neuroevolution over innovation-numbered graph
//! genomes, with speciation and fitness sharing.

mod engine;
pub mod genome;
pub mod species;

pub use engine::NeatEngine;
pub use genome::InnovationContext;
