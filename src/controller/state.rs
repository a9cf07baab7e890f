use crate::config::types::{
    is_sentinel, Candidate, ComplexityLabel, ExecutionProfile, Phase, Plan, Verdict,
};
use crate::controller::producers::PlanFeedback;
use serde::{Deserialize, Serialize};

/// Summary of one completed iteration, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub iteration: u32,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub complexity: ComplexityLabel,
    pub efficient: bool,
    /// `None` when the largest size failed.
    pub worst_runtime_ms: Option<f64>,
    pub perf_gain: f64,
}

/// Mutable state of one pipeline run. Discarded at a terminal phase.
#[derive(Debug)]
pub struct PipelineState {
    pub phase: Phase,
    /// Completed iterations.
    pub iteration: u32,
    pub failures: u32,
    pub stalls: u32,
    pub last_worst_ms: Option<f64>,
    pub pending_patch: Option<String>,
    pub next_note: Option<String>,
    pub feedback: Option<PlanFeedback>,
    pub plan: Option<Plan>,
    pub candidate: Option<Candidate>,
    pub profile: Option<ExecutionProfile>,
    pub last_verdict: Option<Verdict>,
    pub attempts: Vec<Attempt>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Planning,
            iteration: 0,
            failures: 0,
            stalls: 0,
            last_worst_ms: None,
            pending_patch: None,
            next_note: None,
            feedback: None,
            plan: None,
            candidate: None,
            profile: None,
            last_verdict: None,
            attempts: Vec::new(),
        }
    }

    pub fn transition(&mut self, next: Phase) {
        log::debug!("{} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Relative improvement of `worst_ms` over the previous iteration.
    /// `None` on the first iteration or when either side is the sentinel.
    pub fn gain_over_previous(&self, worst_ms: f64) -> Option<f64> {
        match self.last_worst_ms {
            Some(prev) if !is_sentinel(prev) && !is_sentinel(worst_ms) && prev > 0.0 => {
                Some((prev - worst_ms) / prev)
            }
            _ => None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SENTINEL;

    #[test]
    fn test_gain_skipped_without_history() {
        assert_eq!(PipelineState::new().gain_over_previous(10.0), None);
    }

    #[test]
    fn test_gain_skipped_for_sentinels() {
        let mut state = PipelineState::new();
        state.last_worst_ms = Some(SENTINEL);
        assert_eq!(state.gain_over_previous(10.0), None);
        state.last_worst_ms = Some(10.0);
        assert_eq!(state.gain_over_previous(SENTINEL), None);
    }

    #[test]
    fn test_gain_is_relative() {
        let mut state = PipelineState::new();
        state.last_worst_ms = Some(200.0);
        assert_eq!(state.gain_over_previous(150.0), Some(0.25));
        assert_eq!(state.gain_over_previous(300.0), Some(-0.5));
    }
}
