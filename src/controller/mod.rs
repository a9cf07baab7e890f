//! Iterative refinement: plan, prune, code, profile, analyze, route.

pub mod producers;
pub mod pruner;
pub mod solve_loop;
pub mod state;

pub use producers::{Analyzer, Coder, GeneratedCode, PlanFeedback, Planner, Profiling, Pruner};
pub use pruner::{PruneDecision, StaticPruner};
pub use solve_loop::{
    Components, FailureReason, LoopLimits, PipelineOutcome, RefinementController, RunResult,
};
