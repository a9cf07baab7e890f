//! Adapters for the external planner, coder and complexity oracle.

pub mod command;

pub use command::{CommandProducer, ProducerSet};
