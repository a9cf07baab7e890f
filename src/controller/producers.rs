//! Seams between the controller and the components it sequences.
//!
//! Plan and code generation live outside this crate; profiling and analysis
//! are implemented by [`crate::profiler::Profiler`] and
//! [`crate::verdict::ComplexityClassifier`].

use crate::config::types::{
    ComplexityLabel, ExecutionProfile, Plan, ProblemSpec, Result, Candidate, Verdict,
};
use crate::controller::pruner::PruneDecision;
use serde::{Deserialize, Serialize};

/// Structured context handed to the planner when a plan is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFeedback {
    pub previous_algorithm: String,
    pub worst_runtime_ms: Option<f64>,
    pub observed_complexity: ComplexityLabel,
    pub required_ceiling: ComplexityLabel,
    pub runtime_limit_ms: u64,
}

/// Coder output. Flags are appended to the toolchain's fixed set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub source: String,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
}

pub trait Planner: Send + Sync {
    fn plan(&self, problem: &ProblemSpec, feedback: Option<&PlanFeedback>) -> Result<Plan>;
}

pub trait Coder: Send + Sync {
    fn generate(
        &self,
        problem: &ProblemSpec,
        plan: &Plan,
        patch: Option<&str>,
    ) -> Result<GeneratedCode>;
}

pub trait Pruner: Send + Sync {
    fn validate(&self, plan: &Plan) -> PruneDecision;
}

pub trait Profiling: Send + Sync {
    fn profile(&self, candidate: &Candidate, plan: &Plan) -> Result<ExecutionProfile>;
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, profile: &ExecutionProfile) -> Result<Verdict>;
}
