//! Observability
//!
//! Pipeline metrics for operational visibility.

pub mod metrics;

pub use metrics::PipelineMetrics;
