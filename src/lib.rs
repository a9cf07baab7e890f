//! perfbox: a complexity-aware judge
//! Compiles candidate programs, measures them across a ladder of input sizes,
//! infers their asymptotic complexity and drives a bounded refinement loop.
//!
//! # Architecture
//!
//! ## Execution Sandbox ([`exec`])
//! - [`exec::compiler`]: Compilation with retry and a content-addressed binary store
//! - [`exec::executor`]: Bounded runs through an external measurement instrument
//! - [`exec::telemetry`]: Instrument detection and report parsing
//! - [`exec::process`]: Child processes with wall-clock and address-space limits
//!
//! ## Toolchains ([`judge`])
//! - [`judge::adapter`]: Compile/run command envelopes per language
//! - [`judge::registry`]: Adapter lookup by language name
//!
//! ## Profiling ([`profiler`])
//! - [`profiler::ladder`]: Input size ladders
//! - [`profiler::generator`]: Deterministic input generators
//! - [`profiler::hotspots`]: Optional gprof flat-profile hotspots
//!
//! ## Classification ([`verdict`])
//! - [`verdict::fit`]: Log-log least squares
//! - [`verdict::ambiguity`]: Ambiguity detection
//! - [`verdict::oracle`]: Oracle boundary and label normalization
//! - [`verdict::classifier`]: Verdicts with routing and patch directives
//!
//! ## Refinement ([`controller`])
//! - [`controller::pruner`]: Static plan rejection rules
//! - [`controller::solve_loop`]: The refinement state machine
//!
//! ## Surfaces
//! - [`producers`]: JSON-over-stdio planner, coder and oracle commands
//! - [`batch`]: Worker pool and on-disk results
//! - [`server`]: HTTP API
//! - [`cli`]: `perfbox` and `perfbox-judge` entry points
//!
//! ## Support
//! - [`config`]: Settings, validation, data model and errors
//! - [`safety`]: Run-scoped workspaces and the binary store
//! - [`observability`]: Prometheus metrics

// Configuration, data model and errors
pub mod config;

// Language adapters
pub mod judge;

// Execution sandbox
pub mod exec;

// Workspaces and binary store
pub mod safety;

// Size ladders, generators and profiling
pub mod profiler;

// Complexity classification
pub mod verdict;

// Refinement loop
pub mod controller;

// End-to-end wiring
pub mod pipeline;

// External producers
pub mod producers;

// Batch benchmarking
pub mod batch;

// HTTP front end
pub mod server;

// Observability
pub mod observability;

// CLI entrypoint wiring shared by the perfbox binaries.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
