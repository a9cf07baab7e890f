//! Iterative refinement controller.
//!
//! Sequences plan -> prune -> code -> profile -> analyze and decides after
//! every analysis whether to accept, patch, replan or abort. All limits come
//! from [`LoopLimits`]; nothing here reads global state.

use crate::config::settings::Settings;
use crate::config::types::{
    is_sentinel, Candidate, ComplexityLabel, ExecutionProfile, JudgeError, Phase, ProblemSpec,
    TargetProducer, Verdict,
};
use crate::controller::producers::{Analyzer, Coder, PlanFeedback, Planner, Profiling, Pruner};
use crate::controller::pruner::PruneDecision;
use crate::controller::state::{Attempt, PipelineState};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopLimits {
    pub max_iterations: u32,
    pub diminish_delta: f64,
    pub stall_patience: u32,
    pub max_agent_failures: u32,
}

impl LoopLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            diminish_delta: settings.diminish_delta,
            stall_patience: settings.stall_patience.max(1),
            max_agent_failures: settings.max_agent_failures.max(1),
        }
    }
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ConvergenceStall { gain: f64 },
    IterationCap { max_iterations: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConvergenceStall { gain } => {
                write!(f, "convergence stall (gain {:.1}%)", gain * 100.0)
            }
            Self::IterationCap { max_iterations } => {
                write!(f, "iteration cap reached ({} iterations)", max_iterations)
            }
        }
    }
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success {
        candidate: Candidate,
        profile: ExecutionProfile,
        verdict: Verdict,
        iterations: u32,
    },
    StaticPruneFailed {
        rule: String,
        reason: String,
    },
    AgentFailure {
        phase: Phase,
        error: String,
        details: String,
    },
    Failed {
        reason: FailureReason,
        last_verdict: Option<Verdict>,
        attempts: Vec<Attempt>,
    },
}

impl PipelineOutcome {
    /// Metric label for this outcome.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::StaticPruneFailed { .. } => "static_prune_failed",
            Self::AgentFailure { .. } => "agent_failure",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Phase the run ends in.
    pub fn terminal_phase(&self) -> Phase {
        match self {
            Self::Success { .. } => Phase::Accepted,
            Self::StaticPruneFailed { .. } => Phase::Rejected,
            Self::AgentFailure { .. } | Self::Failed { .. } => Phase::Aborted,
        }
    }
}

/// Wire form of [`PipelineOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Success {
        code: String,
        profile: ExecutionProfile,
        verdict: Verdict,
        iterations: u32,
    },
    StaticPruneFailed {
        rule: String,
        reason: String,
    },
    AgentFailure {
        error: String,
        details: String,
    },
    Failed {
        reason: String,
        last_verdict: Option<Verdict>,
        attempts: Vec<Attempt>,
    },
}

impl From<PipelineOutcome> for RunResult {
    fn from(outcome: PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Success {
                candidate,
                profile,
                verdict,
                iterations,
            } => Self::Success {
                code: candidate.source,
                profile,
                verdict,
                iterations,
            },
            PipelineOutcome::StaticPruneFailed { rule, reason } => {
                Self::StaticPruneFailed { rule, reason }
            }
            PipelineOutcome::AgentFailure {
                phase,
                error,
                details,
            } => Self::AgentFailure {
                error: format!("{} failed: {}", phase, error),
                details,
            },
            PipelineOutcome::Failed {
                reason,
                last_verdict,
                attempts,
            } => Self::Failed {
                reason: reason.to_string(),
                last_verdict,
                attempts,
            },
        }
    }
}

/// The producers one run is wired to.
pub struct Components<'a> {
    pub planner: &'a dyn Planner,
    pub coder: &'a dyn Coder,
    pub pruner: &'a dyn Pruner,
    pub profiler: &'a dyn Profiling,
    pub analyzer: &'a dyn Analyzer,
}

pub struct RefinementController<'a> {
    limits: LoopLimits,
    components: Components<'a>,
}

impl<'a> RefinementController<'a> {
    pub fn new(limits: LoopLimits, components: Components<'a>) -> Self {
        Self { limits, components }
    }

    pub fn run(&self, problem: &ProblemSpec) -> PipelineOutcome {
        log::info!("Solving task {}", problem.task_id);
        let mut state = PipelineState::new();
        let outcome = loop {
            if let Some(outcome) = self.step(problem, &mut state) {
                break outcome;
            }
        };
        state.transition(outcome.terminal_phase());
        log::info!(
            "Task {} finished in {} ({})",
            problem.task_id,
            state.phase,
            outcome.status()
        );
        outcome
    }

    /// Advance the current phase. Only [`RefinementController::run`] enters a
    /// terminal phase, after the last step has produced the outcome.
    fn step(&self, problem: &ProblemSpec, state: &mut PipelineState) -> Option<PipelineOutcome> {
        match state.phase {
            Phase::Planning | Phase::Replanning => self.plan(problem, state),
            Phase::Pruning => self.prune(state),
            Phase::Coding => self.code(problem, state),
            Phase::Profiling => self.profile(state),
            Phase::Analyzing => self.analyze(problem, state),
            Phase::Patching => {
                state.transition(Phase::Coding);
                None
            }
            Phase::Accepted | Phase::Rejected | Phase::Aborted => None,
        }
    }

    fn plan(&self, problem: &ProblemSpec, state: &mut PipelineState) -> Option<PipelineOutcome> {
        let phase = state.phase;
        match self.components.planner.plan(problem, state.feedback.as_ref()) {
            Ok(plan) => {
                log::info!("Plan: {}", plan.algorithm);
                state.plan = Some(plan);
                if phase == Phase::Planning {
                    state.transition(Phase::Pruning);
                } else {
                    state.next_note = Some("replanned".to_string());
                    state.transition(Phase::Coding);
                }
                None
            }
            Err(e) => self.record_failure(state, phase, phase, e),
        }
    }

    fn prune(&self, state: &mut PipelineState) -> Option<PipelineOutcome> {
        let Some(plan) = state.plan.as_ref() else {
            state.transition(Phase::Planning);
            return None;
        };
        match self.components.pruner.validate(plan) {
            PruneDecision::Accept => {
                state.transition(Phase::Coding);
                None
            }
            PruneDecision::Reject { rule, reason } => {
                Some(PipelineOutcome::StaticPruneFailed { rule, reason })
            }
        }
    }

    fn code(&self, problem: &ProblemSpec, state: &mut PipelineState) -> Option<PipelineOutcome> {
        if state.iteration >= self.limits.max_iterations {
            return Some(PipelineOutcome::Failed {
                reason: FailureReason::IterationCap {
                    max_iterations: self.limits.max_iterations,
                },
                last_verdict: state.last_verdict.clone(),
                attempts: std::mem::take(&mut state.attempts),
            });
        }
        let Some(plan) = state.plan.as_ref() else {
            state.transition(Phase::Planning);
            return None;
        };
        match self
            .components
            .coder
            .generate(problem, plan, state.pending_patch.as_deref())
        {
            Ok(code) => {
                state.pending_patch = None;
                state.candidate = Some(Candidate {
                    source: code.source,
                    compiler_flags: code.compiler_flags,
                    iteration: state.iteration + 1,
                    note: state.next_note.take(),
                });
                state.transition(Phase::Profiling);
                None
            }
            Err(e) => self.record_failure(state, Phase::Coding, Phase::Coding, e),
        }
    }

    fn profile(&self, state: &mut PipelineState) -> Option<PipelineOutcome> {
        let (Some(candidate), Some(plan)) = (state.candidate.as_ref(), state.plan.as_ref()) else {
            state.transition(Phase::Coding);
            return None;
        };
        match self.components.profiler.profile(candidate, plan) {
            Ok(profile) => {
                state.profile = Some(profile);
                state.transition(Phase::Analyzing);
                None
            }
            // The candidate itself is unusable; ask for new code.
            Err(e @ JudgeError::Compile { .. }) => {
                self.record_failure(state, Phase::Profiling, Phase::Coding, e)
            }
            Err(e) => self.record_failure(state, Phase::Profiling, Phase::Profiling, e),
        }
    }

    fn analyze(&self, problem: &ProblemSpec, state: &mut PipelineState) -> Option<PipelineOutcome> {
        let (Some(profile), Some(candidate)) = (state.profile.clone(), state.candidate.clone())
        else {
            state.transition(Phase::Profiling);
            return None;
        };
        let mut verdict = match self.components.analyzer.analyze(&profile) {
            Ok(verdict) => verdict,
            Err(e) => return self.record_failure(state, Phase::Analyzing, Phase::Analyzing, e),
        };

        state.iteration += 1;
        let worst = profile.worst_runtime_ms();
        let gain = state.gain_over_previous(worst);
        if let Some(gain) = gain {
            verdict.set_perf_gain(gain);
        }
        let algorithm = state
            .plan
            .as_ref()
            .map(|p| p.algorithm.clone())
            .unwrap_or_default();

        log::info!(
            "Iteration {}: {} (efficient={}, worst={:.2} ms, gain={})",
            state.iteration,
            verdict.complexity(),
            verdict.is_efficient(),
            worst,
            gain.map(|g| format!("{:.3}", g)).unwrap_or_else(|| "n/a".to_string())
        );

        state.attempts.push(Attempt {
            iteration: state.iteration,
            algorithm: algorithm.clone(),
            note: candidate.note.clone(),
            complexity: verdict.complexity(),
            efficient: verdict.is_efficient(),
            worst_runtime_ms: (!is_sentinel(worst)).then_some(worst),
            perf_gain: verdict.perf_gain(),
        });
        state.last_worst_ms = Some(worst);
        state.last_verdict = Some(verdict.clone());

        if verdict.is_efficient() {
            return Some(PipelineOutcome::Success {
                candidate,
                profile,
                verdict,
                iterations: state.iteration,
            });
        }

        if let Some(gain) = gain {
            if gain < self.limits.diminish_delta {
                state.stalls += 1;
                if state.stalls >= self.limits.stall_patience {
                    return Some(PipelineOutcome::Failed {
                        reason: FailureReason::ConvergenceStall { gain },
                        last_verdict: Some(verdict),
                        attempts: std::mem::take(&mut state.attempts),
                    });
                }
            } else {
                state.stalls = 0;
            }
        }

        match verdict.target() {
            Some(TargetProducer::Coder) => {
                state.pending_patch = verdict.patch().map(str::to_string);
                state.next_note = Some("patched".to_string());
                state.transition(Phase::Patching);
            }
            _ => {
                state.feedback = Some(PlanFeedback {
                    previous_algorithm: algorithm,
                    worst_runtime_ms: (!is_sentinel(worst)).then_some(worst),
                    observed_complexity: verdict.complexity(),
                    required_ceiling: ComplexityLabel::Linearithmic,
                    runtime_limit_ms: problem.constraints.runtime_limit_ms,
                });
                state.transition(Phase::Replanning);
            }
        }
        None
    }

    /// Count a producer failure. Below the budget the run resumes at `retry`;
    /// at the budget it aborts naming `phase`.
    fn record_failure(
        &self,
        state: &mut PipelineState,
        phase: Phase,
        retry: Phase,
        error: JudgeError,
    ) -> Option<PipelineOutcome> {
        state.failures += 1;
        log::warn!(
            "{} failed ({}/{}): {}",
            phase,
            state.failures,
            self.limits.max_agent_failures,
            error
        );
        if state.failures >= self.limits.max_agent_failures {
            return Some(PipelineOutcome::AgentFailure {
                phase,
                error: error.to_string(),
                details: format!(
                    "{} producer failures (limit {}), last during {} at iteration {}",
                    state.failures, self.limits.max_agent_failures, phase, state.iteration
                ),
            });
        }
        state.transition(retry);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_wire_tags() {
        let result: RunResult = PipelineOutcome::StaticPruneFailed {
            rule: "sort_inside_loop".to_string(),
            reason: "sorting inside a loop".to_string(),
        }
        .into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "static_prune_failed");
        assert_eq!(json["rule"], "sort_inside_loop");
    }

    #[test]
    fn test_agent_failure_names_phase() {
        let result: RunResult = PipelineOutcome::AgentFailure {
            phase: Phase::Coding,
            error: "timeout".to_string(),
            details: "3 producer failures".to_string(),
        }
        .into();
        match result {
            RunResult::AgentFailure { error, .. } => assert!(error.starts_with("coding")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_phase_per_outcome() {
        let pruned = PipelineOutcome::StaticPruneFailed {
            rule: "deep_loop_nesting".to_string(),
            reason: String::new(),
        };
        assert_eq!(pruned.terminal_phase(), Phase::Rejected);
        let failed = PipelineOutcome::Failed {
            reason: FailureReason::ConvergenceStall { gain: 0.0 },
            last_verdict: None,
            attempts: Vec::new(),
        };
        assert_eq!(failed.terminal_phase(), Phase::Aborted);
        assert!(failed.terminal_phase().is_terminal());
    }

    #[test]
    fn test_failure_reason_display() {
        let stall = FailureReason::ConvergenceStall { gain: 0.01 };
        assert!(stall.to_string().contains("convergence stall"));
        let cap = FailureReason::IterationCap { max_iterations: 3 };
        assert_eq!(cap.to_string(), "iteration cap reached (3 iterations)");
    }
}
