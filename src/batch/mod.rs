//! Batch benchmarking over a directory of tasks.

pub mod pool;
pub mod runner;

pub use pool::WorkerPool;
pub use runner::{BatchRunner, BatchSummary, RunRecord};
