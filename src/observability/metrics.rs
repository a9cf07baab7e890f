// Pipeline metrics
//
// Counters per pipeline outcome, a gauge of in-flight runs and a run latency
// histogram, exported in Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::controller::{FailureReason, PipelineOutcome};

/// Counter metric (monotonically increasing)
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauge metric (can go up or down)
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate at zero.
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for run durations
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // sum in microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for whole pipeline runs, which span compiles and many executions.
    pub fn new_run_latency() -> Self {
        Self::with_bounds(&[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0])
    }

    pub fn with_bounds(bounds: &[f64]) -> Self {
        Self {
            buckets: bounds
                .iter()
                .map(|&le| HistogramBucket {
                    le,
                    count: AtomicU64::new(0),
                })
                .collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        self.sum
            .fetch_add(value.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 0.0001)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Metrics for pipeline runs. Shared by handle; there is no global instance.
#[derive(Debug)]
pub struct PipelineMetrics {
    pub runs_total: Counter,
    pub runs_success: Counter,
    pub runs_static_prune_failed: Counter,
    pub runs_agent_failure: Counter,
    pub runs_failed: Counter,
    /// Runs that could not start (configuration or sandbox setup).
    pub runs_error: Counter,

    pub failed_convergence_stall: Counter,
    pub failed_iteration_cap: Counter,

    pub iterations_total: Counter,
    pub oracle_escalations: Counter,

    pub active_runs: Gauge,
    pub run_latency: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            runs_total: Counter::new(),
            runs_success: Counter::new(),
            runs_static_prune_failed: Counter::new(),
            runs_agent_failure: Counter::new(),
            runs_failed: Counter::new(),
            runs_error: Counter::new(),
            failed_convergence_stall: Counter::new(),
            failed_iteration_cap: Counter::new(),
            iterations_total: Counter::new(),
            oracle_escalations: Counter::new(),
            active_runs: Gauge::new(),
            run_latency: Histogram::new_run_latency(),
        }
    }

    pub fn run_started(&self) {
        self.active_runs.inc();
    }

    pub fn record_outcome(&self, outcome: &PipelineOutcome, elapsed: Duration) {
        self.runs_total.inc();
        self.run_latency.observe(elapsed);
        match outcome {
            PipelineOutcome::Success {
                verdict,
                iterations,
                ..
            } => {
                self.runs_success.inc();
                self.iterations_total.add(u64::from(*iterations));
                if verdict.escalated() {
                    self.oracle_escalations.inc();
                }
            }
            PipelineOutcome::StaticPruneFailed { .. } => self.runs_static_prune_failed.inc(),
            PipelineOutcome::AgentFailure { .. } => self.runs_agent_failure.inc(),
            PipelineOutcome::Failed {
                reason,
                last_verdict,
                attempts,
            } => {
                self.runs_failed.inc();
                self.iterations_total.add(attempts.len() as u64);
                match reason {
                    FailureReason::ConvergenceStall { .. } => self.failed_convergence_stall.inc(),
                    FailureReason::IterationCap { .. } => self.failed_iteration_cap.inc(),
                }
                if last_verdict.as_ref().is_some_and(|v| v.escalated()) {
                    self.oracle_escalations.inc();
                }
            }
        }
    }

    pub fn record_error(&self, elapsed: Duration) {
        self.runs_total.inc();
        self.runs_error.inc();
        self.run_latency.observe(elapsed);
    }

    pub fn run_finished(&self) {
        self.active_runs.dec();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# HELP perfbox_runs_total Total number of pipeline runs");
        let _ = writeln!(output, "# TYPE perfbox_runs_total counter");
        let _ = writeln!(output, "perfbox_runs_total {}", self.runs_total.get());

        let _ = writeln!(output, "# HELP perfbox_runs_by_status Pipeline runs by outcome");
        let _ = writeln!(output, "# TYPE perfbox_runs_by_status counter");
        for (status, counter) in [
            ("success", &self.runs_success),
            ("static_prune_failed", &self.runs_static_prune_failed),
            ("agent_failure", &self.runs_agent_failure),
            ("failed", &self.runs_failed),
            ("error", &self.runs_error),
        ] {
            let _ = writeln!(
                output,
                "perfbox_runs_by_status{{status=\"{}\"}} {}",
                status,
                counter.get()
            );
        }

        let _ = writeln!(output, "# HELP perfbox_failures_by_reason Failed runs by reason");
        let _ = writeln!(output, "# TYPE perfbox_failures_by_reason counter");
        let _ = writeln!(
            output,
            "perfbox_failures_by_reason{{reason=\"convergence_stall\"}} {}",
            self.failed_convergence_stall.get()
        );
        let _ = writeln!(
            output,
            "perfbox_failures_by_reason{{reason=\"iteration_cap\"}} {}",
            self.failed_iteration_cap.get()
        );

        let _ = writeln!(output, "# HELP perfbox_iterations_total Completed refinement iterations");
        let _ = writeln!(output, "# TYPE perfbox_iterations_total counter");
        let _ = writeln!(output, "perfbox_iterations_total {}", self.iterations_total.get());

        let _ = writeln!(output, "# HELP perfbox_oracle_escalations_total Verdicts settled by the oracle");
        let _ = writeln!(output, "# TYPE perfbox_oracle_escalations_total counter");
        let _ = writeln!(
            output,
            "perfbox_oracle_escalations_total {}",
            self.oracle_escalations.get()
        );

        let _ = writeln!(output, "# HELP perfbox_active_runs Currently running pipelines");
        let _ = writeln!(output, "# TYPE perfbox_active_runs gauge");
        let _ = writeln!(output, "perfbox_active_runs {}", self.active_runs.get());

        let _ = writeln!(output, "# HELP perfbox_run_duration_seconds Pipeline run duration");
        let _ = writeln!(output, "# TYPE perfbox_run_duration_seconds histogram");
        for bucket in &self.run_latency.buckets {
            let _ = writeln!(
                output,
                "perfbox_run_duration_seconds_bucket{{le=\"{}\"}} {}",
                bucket.le,
                bucket.count.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(
            output,
            "perfbox_run_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            self.run_latency.get_count()
        );
        let _ = writeln!(
            output,
            "perfbox_run_duration_seconds_sum {}",
            self.run_latency.get_sum_micros() as f64 / 1_000_000.0
        );
        let _ = writeln!(
            output,
            "perfbox_run_duration_seconds_count {}",
            self.run_latency.get_count()
        );

        output
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{Candidate, ComplexityLabel, Confidence, ExecutionProfile, Phase, Verdict};

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge_saturates() {
        let gauge = Gauge::new();
        gauge.inc();
        gauge.dec();
        gauge.dec();
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new_run_latency();

        histogram.observe(Duration::from_millis(50));
        histogram.observe(Duration::from_millis(800));
        histogram.observe(Duration::from_secs(45));

        assert_eq!(histogram.get_count(), 3);
        // Buckets are cumulative.
        assert_eq!(histogram.get_bucket_count(0.1), 1);
        assert_eq!(histogram.get_bucket_count(1.0), 2);
        assert_eq!(histogram.get_bucket_count(30.0), 2);
        assert_eq!(histogram.get_bucket_count(60.0), 3);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = PipelineMetrics::new();
        let success = PipelineOutcome::Success {
            candidate: Candidate {
                source: String::new(),
                compiler_flags: Vec::new(),
                iteration: 2,
                note: None,
            },
            profile: ExecutionProfile::with_sizes(vec![1]),
            verdict: Verdict::efficient(ComplexityLabel::Linear, Confidence::High)
                .with_escalation(true),
            iterations: 2,
        };
        let stalled = PipelineOutcome::Failed {
            reason: FailureReason::ConvergenceStall { gain: 0.01 },
            last_verdict: None,
            attempts: Vec::new(),
        };
        let agent = PipelineOutcome::AgentFailure {
            phase: Phase::Coding,
            error: "e".to_string(),
            details: "d".to_string(),
        };

        metrics.record_outcome(&success, Duration::from_secs(1));
        metrics.record_outcome(&stalled, Duration::from_secs(2));
        metrics.record_outcome(&agent, Duration::from_secs(3));
        metrics.record_error(Duration::from_millis(1));

        assert_eq!(metrics.runs_total.get(), 4);
        assert_eq!(metrics.runs_success.get(), 1);
        assert_eq!(metrics.runs_failed.get(), 1);
        assert_eq!(metrics.failed_convergence_stall.get(), 1);
        assert_eq!(metrics.runs_agent_failure.get(), 1);
        assert_eq!(metrics.runs_error.get(), 1);
        assert_eq!(metrics.iterations_total.get(), 2);
        assert_eq!(metrics.oracle_escalations.get(), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = PipelineMetrics::new();
        metrics.run_started();
        metrics.record_outcome(
            &PipelineOutcome::StaticPruneFailed {
                rule: "r".to_string(),
                reason: "x".to_string(),
            },
            Duration::from_millis(300),
        );

        let text = metrics.export_prometheus();
        assert!(text.contains("# TYPE perfbox_runs_total counter"));
        assert!(text.contains("perfbox_runs_total 1"));
        assert!(text.contains("perfbox_runs_by_status{status=\"static_prune_failed\"} 1"));
        assert!(text.contains("perfbox_active_runs 1"));
        assert!(text.contains("perfbox_run_duration_seconds_bucket{le=\"0.5\"} 1"));
        assert!(text.contains("perfbox_run_duration_seconds_count 1"));
    }
}
