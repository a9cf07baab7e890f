//! Empirical complexity classification
//!
//! Log-log trend fitting, ambiguity detection, oracle escalation and
//! patch-directive routing.

pub mod ambiguity;
pub mod classifier;
pub mod fit;
pub mod oracle;

pub use classifier::ComplexityClassifier;
pub use oracle::{normalize_label, ComplexityOracle, SeriesSummary};
