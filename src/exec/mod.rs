//! Execution sandbox
//!
//! Compiles candidates into a content-addressed store and runs them under
//! wall-clock and memory bounds through a measurement instrument.

pub mod compiler;
pub mod executor;
pub mod process;
pub mod sandbox;
pub mod telemetry;

pub use executor::{RunLimits, RunTelemetry};
pub use sandbox::Sandbox;
