/// Core types and structures for the perfbox system
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Reserved marker for a failed measurement point.
pub const SENTINEL: f64 = f64::INFINITY;

/// True when a runtime/memory slot holds the failure sentinel.
pub fn is_sentinel(value: f64) -> bool {
    value.is_infinite()
}

/// Runtime and memory constraints attached to a problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(alias = "runtime_limit")]
    pub runtime_limit_ms: u64,
    #[serde(alias = "memory_limit")]
    pub memory_limit_mb: u64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            runtime_limit_ms: 2000,
            memory_limit_mb: 512,
        }
    }
}

/// One input/output example pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTest {
    pub input: String,
    pub output: String,
}

/// Inbound problem. Created once per request and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemSpec {
    pub task_id: String,
    pub prompt: String,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub unit_tests: Vec<UnitTest>,
}

/// Output of the planning producer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub algorithm: String,
    #[serde(default)]
    pub input_bounds: BTreeMap<String, i64>,
    #[serde(default)]
    pub constraints: BTreeMap<String, i64>,
}

impl Plan {
    /// Largest declared input bound, if any bound is positive.
    pub fn max_bound(&self) -> Option<u64> {
        self.input_bounds
            .values()
            .copied()
            .filter(|b| *b > 0)
            .max()
            .map(|b| b as u64)
    }
}

/// A compilable source artifact for one iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub source: String,
    pub compiler_flags: Vec<String>,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// How the numbers in a profile were obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    /// Validated external instrument.
    #[default]
    Instrumented,
    /// Host clock and rusage high-water mark.
    Fallback,
}

/// Measured runtime/memory series across a size ladder.
///
/// Length is fixed when the profile is created; slots are written by ladder
/// index and start out as [`SENTINEL`]. Serialized with `null` for sentinels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireProfile", try_from = "WireProfile")]
pub struct ExecutionProfile {
    input_sizes: Vec<u64>,
    runtime_ms: Vec<f64>,
    peak_memory_mb: Vec<f64>,
    pub hotspots: BTreeMap<String, String>,
    pub fidelity: Fidelity,
}

impl ExecutionProfile {
    /// Allocate a profile with every point set to the sentinel.
    pub fn with_sizes(input_sizes: Vec<u64>) -> Self {
        let len = input_sizes.len();
        Self {
            input_sizes,
            runtime_ms: vec![SENTINEL; len],
            peak_memory_mb: vec![SENTINEL; len],
            hotspots: BTreeMap::new(),
            fidelity: Fidelity::Instrumented,
        }
    }

    /// Build a profile from already-measured series.
    pub fn from_series(
        input_sizes: Vec<u64>,
        runtime_ms: Vec<f64>,
        peak_memory_mb: Vec<f64>,
    ) -> Result<Self> {
        if input_sizes.len() != runtime_ms.len() || input_sizes.len() != peak_memory_mb.len() {
            return Err(JudgeError::Config(format!(
                "profile series length mismatch: sizes={} runtime={} memory={}",
                input_sizes.len(),
                runtime_ms.len(),
                peak_memory_mb.len()
            )));
        }
        Ok(Self {
            input_sizes,
            runtime_ms,
            peak_memory_mb,
            hotspots: BTreeMap::new(),
            fidelity: Fidelity::Instrumented,
        })
    }

    /// Record one measurement. Out-of-range indices are ignored.
    pub fn record(&mut self, index: usize, runtime_ms: f64, peak_memory_mb: f64) {
        if index < self.input_sizes.len() {
            self.runtime_ms[index] = runtime_ms;
            self.peak_memory_mb[index] = peak_memory_mb;
        }
    }

    pub fn len(&self) -> usize {
        self.input_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_sizes.is_empty()
    }

    pub fn input_sizes(&self) -> &[u64] {
        &self.input_sizes
    }

    pub fn runtime_ms(&self) -> &[f64] {
        &self.runtime_ms
    }

    pub fn peak_memory_mb(&self) -> &[f64] {
        &self.peak_memory_mb
    }

    /// Runtime at the largest size, the worst-case proxy.
    pub fn worst_runtime_ms(&self) -> f64 {
        self.runtime_ms.last().copied().unwrap_or(SENTINEL)
    }

    /// Count of slots still holding the sentinel.
    pub fn failed_points(&self) -> usize {
        self.runtime_ms.iter().filter(|r| is_sentinel(**r)).count()
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WireProfile {
    input_sizes: Vec<u64>,
    runtime_ms: Vec<Option<f64>>,
    peak_memory_mb: Vec<Option<f64>>,
    #[serde(default)]
    hotspots: BTreeMap<String, String>,
    #[serde(default)]
    fidelity: Fidelity,
}

fn to_wire(values: Vec<f64>) -> Vec<Option<f64>> {
    values
        .into_iter()
        .map(|v| if v.is_finite() { Some(v) } else { None })
        .collect()
}

fn from_wire(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(SENTINEL)).collect()
}

impl From<ExecutionProfile> for WireProfile {
    fn from(profile: ExecutionProfile) -> Self {
        Self {
            input_sizes: profile.input_sizes,
            runtime_ms: to_wire(profile.runtime_ms),
            peak_memory_mb: to_wire(profile.peak_memory_mb),
            hotspots: profile.hotspots,
            fidelity: profile.fidelity,
        }
    }
}

impl TryFrom<WireProfile> for ExecutionProfile {
    type Error = JudgeError;

    fn try_from(wire: WireProfile) -> Result<Self> {
        let mut profile = ExecutionProfile::from_series(
            wire.input_sizes,
            from_wire(wire.runtime_ms),
            from_wire(wire.peak_memory_mb),
        )?;
        profile.hotspots = wire.hotspots;
        profile.fidelity = wire.fidelity;
        Ok(profile)
    }
}

/// Closed set of complexity classes the judge reasons about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplexityLabel {
    #[serde(rename = "O(1)")]
    Constant,
    #[serde(rename = "O(log n)")]
    Logarithmic,
    #[serde(rename = "O(n)")]
    Linear,
    #[serde(rename = "O(n log n)")]
    Linearithmic,
    #[serde(rename = "O(n^2)")]
    Quadratic,
    #[serde(rename = "O(n^3)")]
    Cubic,
    /// High-order polynomial or worse.
    #[serde(rename = "O(n^k)")]
    HighOrder,
    #[serde(rename = "O(2^n)")]
    Exponential,
    #[serde(rename = "O(?)")]
    Unknown,
}

impl ComplexityLabel {
    /// Labels an oracle may answer with.
    pub const ALLOWED: [ComplexityLabel; 8] = [
        ComplexityLabel::Constant,
        ComplexityLabel::Logarithmic,
        ComplexityLabel::Linear,
        ComplexityLabel::Linearithmic,
        ComplexityLabel::Quadratic,
        ComplexityLabel::Cubic,
        ComplexityLabel::HighOrder,
        ComplexityLabel::Exponential,
    ];

    pub fn notation(&self) -> &'static str {
        match self {
            Self::Constant => "O(1)",
            Self::Logarithmic => "O(log n)",
            Self::Linear => "O(n)",
            Self::Linearithmic => "O(n log n)",
            Self::Quadratic => "O(n^2)",
            Self::Cubic => "O(n^3)",
            Self::HighOrder => "O(n^k)",
            Self::Exponential => "O(2^n)",
            Self::Unknown => "O(?)",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Logarithmic => "logarithmic",
            Self::Linear => "linear",
            Self::Linearithmic => "linearithmic",
            Self::Quadratic => "quadratic",
            Self::Cubic => "cubic",
            Self::HighOrder => "high-order polynomial",
            Self::Exponential => "exponential",
            Self::Unknown => "unknown",
        }
    }

    /// Classes accepted without further refinement.
    pub fn is_efficient(&self) -> bool {
        matches!(
            self,
            Self::Constant | Self::Logarithmic | Self::Linear | Self::Linearithmic
        )
    }
}

impl fmt::Display for ComplexityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

/// Producer that should act on an inefficient verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetProducer {
    #[serde(rename = "CODER")]
    Coder,
    #[serde(rename = "PLANNER")]
    Planner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

/// Classifier output.
///
/// `target` and `patch` are only reachable through [`Verdict::inefficient`],
/// so an efficient verdict never routes anywhere. Deserialization enforces
/// the same rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireVerdict")]
pub struct Verdict {
    efficient: bool,
    complexity: ComplexityLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<TargetProducer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch: Option<String>,
    perf_gain: f64,
    confidence: Confidence,
    #[serde(default)]
    escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slope: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r_squared: Option<f64>,
}

/// Wire shape of [`Verdict`], checked before it becomes one.
#[derive(Deserialize)]
struct WireVerdict {
    efficient: bool,
    complexity: ComplexityLabel,
    #[serde(default)]
    target: Option<TargetProducer>,
    #[serde(default)]
    patch: Option<String>,
    perf_gain: f64,
    confidence: Confidence,
    #[serde(default)]
    escalated: bool,
    #[serde(default)]
    slope: Option<f64>,
    #[serde(default)]
    r_squared: Option<f64>,
}

impl TryFrom<WireVerdict> for Verdict {
    type Error = JudgeError;

    fn try_from(wire: WireVerdict) -> Result<Self> {
        if wire.efficient && (wire.target.is_some() || wire.patch.is_some()) {
            return Err(JudgeError::Config(
                "efficient verdict cannot carry a target or patch".to_string(),
            ));
        }
        if !wire.efficient && wire.target.is_none() {
            return Err(JudgeError::Config(
                "inefficient verdict requires a target".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&wire.perf_gain) {
            return Err(JudgeError::Config(format!(
                "perf_gain out of range: {}",
                wire.perf_gain
            )));
        }
        Ok(Self {
            efficient: wire.efficient,
            complexity: wire.complexity,
            target: wire.target,
            patch: wire.patch,
            perf_gain: wire.perf_gain,
            confidence: wire.confidence,
            escalated: wire.escalated,
            slope: wire.slope,
            r_squared: wire.r_squared,
        })
    }
}

impl Verdict {
    pub fn efficient(complexity: ComplexityLabel, confidence: Confidence) -> Self {
        Self {
            efficient: true,
            complexity,
            target: None,
            patch: None,
            perf_gain: 0.0,
            confidence,
            escalated: false,
            slope: None,
            r_squared: None,
        }
    }

    pub fn inefficient(
        complexity: ComplexityLabel,
        confidence: Confidence,
        target: TargetProducer,
        patch: Option<String>,
    ) -> Self {
        Self {
            efficient: false,
            complexity,
            target: Some(target),
            patch,
            perf_gain: 0.0,
            confidence,
            escalated: false,
            slope: None,
            r_squared: None,
        }
    }

    pub fn with_fit(mut self, slope: f64, r_squared: f64) -> Self {
        self.slope = Some(slope);
        self.r_squared = Some(r_squared);
        self
    }

    pub fn with_escalation(mut self, escalated: bool) -> Self {
        self.escalated = escalated;
        self
    }

    /// Set the improvement over the prior iteration, clamped to [0, 1].
    pub fn set_perf_gain(&mut self, gain: f64) {
        self.perf_gain = if gain.is_finite() {
            gain.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn is_efficient(&self) -> bool {
        self.efficient
    }

    pub fn complexity(&self) -> ComplexityLabel {
        self.complexity
    }

    pub fn target(&self) -> Option<TargetProducer> {
        self.target
    }

    pub fn patch(&self) -> Option<&str> {
        self.patch.as_deref()
    }

    pub fn perf_gain(&self) -> f64 {
        self.perf_gain
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn escalated(&self) -> bool {
        self.escalated
    }

    pub fn slope(&self) -> Option<f64> {
        self.slope
    }

    pub fn r_squared(&self) -> Option<f64> {
        self.r_squared
    }
}

/// Controller phases. Terminal: `Accepted`, `Rejected`, `Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Pruning,
    Coding,
    Profiling,
    Analyzing,
    Patching,
    Replanning,
    Accepted,
    Rejected,
    Aborted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Pruning => "pruning",
            Self::Coding => "coding",
            Self::Profiling => "profiling",
            Self::Analyzing => "analyzing",
            Self::Patching => "patching",
            Self::Replanning => "replanning",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Errors raised by the judge library
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compilation failed: {diagnostics}")]
    Compile { diagnostics: String },

    #[error("Toolchain error: {0}")]
    Toolchain(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{phase} producer failed: {message}")]
    Producer { phase: Phase, message: String },

    #[error("Complexity oracle failed: {0}")]
    Oracle(String),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecError),
}

/// Conservative numbers reported when the instrument output is unusable.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryEstimate {
    pub stdout: String,
    pub wallclock_ms: f64,
    pub peak_rss_mb: f64,
}

/// Outcome of a single bounded execution that did not produce telemetry.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("execution exceeded {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("execution crashed (exit={exit_code:?}, signal={signal:?}): {stderr}")]
    Crash {
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },

    #[error("telemetry unparseable: {reason}")]
    TelemetryParse {
        reason: String,
        estimate: TelemetryEstimate,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compiled artifact ready to run for every ladder size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledBinary {
    pub path: PathBuf,
    pub store_key: String,
    pub reused: bool,
}

/// Result type alias for perfbox operations
pub type Result<T> = std::result::Result<T, JudgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_preallocates_sentinels() {
        let profile = ExecutionProfile::with_sizes(vec![0, 1, 1000]);
        assert_eq!(profile.len(), 3);
        assert_eq!(profile.runtime_ms().len(), 3);
        assert_eq!(profile.peak_memory_mb().len(), 3);
        assert_eq!(profile.failed_points(), 3);
        assert!(is_sentinel(profile.worst_runtime_ms()));
    }

    #[test]
    fn test_profile_record_ignores_out_of_range() {
        let mut profile = ExecutionProfile::with_sizes(vec![10, 100]);
        profile.record(1, 4.0, 2.0);
        profile.record(7, 1.0, 1.0);
        assert_eq!(profile.runtime_ms(), &[SENTINEL, 4.0]);
        assert_eq!(profile.worst_runtime_ms(), 4.0);
    }

    #[test]
    fn test_profile_wire_uses_null_for_sentinel() {
        let mut profile = ExecutionProfile::with_sizes(vec![1, 2]);
        profile.record(0, 1.5, 3.0);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["runtime_ms"], serde_json::json!([1.5, null]));

        let back: ExecutionProfile = serde_json::from_value(json).unwrap();
        assert!(is_sentinel(back.runtime_ms()[1]));
        assert_eq!(back.runtime_ms()[0], 1.5);
    }

    #[test]
    fn test_profile_rejects_mismatched_lengths() {
        let json = serde_json::json!({
            "input_sizes": [1, 2, 3],
            "runtime_ms": [1.0, 2.0],
            "peak_memory_mb": [1.0, 1.0, 1.0]
        });
        assert!(serde_json::from_value::<ExecutionProfile>(json).is_err());
    }

    #[test]
    fn test_problem_accepts_legacy_constraint_keys() {
        let json = serde_json::json!({
            "task_id": "B001",
            "prompt": "sum",
            "constraints": {"runtime_limit": 1000, "memory_limit": 256},
            "unit_tests": [{"input": "1 2", "output": "3"}]
        });
        let problem: ProblemSpec = serde_json::from_value(json).unwrap();
        assert_eq!(problem.constraints.runtime_limit_ms, 1000);
        assert_eq!(problem.constraints.memory_limit_mb, 256);
    }

    #[test]
    fn test_efficient_verdict_has_no_target() {
        let verdict = Verdict::efficient(ComplexityLabel::Linear, Confidence::High);
        assert!(verdict.target().is_none());
        let json = serde_json::to_value(&verdict).unwrap();
        assert!(json.get("target").is_none());
        assert_eq!(json["complexity"], "O(n)");
    }

    #[test]
    fn test_verdict_deserialize_rejects_routed_efficient() {
        let json = serde_json::json!({
            "efficient": true,
            "complexity": "O(n)",
            "target": "CODER",
            "perf_gain": 0.0,
            "confidence": "high"
        });
        let err = serde_json::from_value::<Verdict>(json).unwrap_err();
        assert!(err.to_string().contains("efficient verdict"));

        let json = serde_json::json!({
            "efficient": false,
            "complexity": "O(n^2)",
            "perf_gain": 0.0,
            "confidence": "low"
        });
        assert!(serde_json::from_value::<Verdict>(json).is_err());
    }

    #[test]
    fn test_verdict_deserialize_keeps_valid_shapes() {
        let verdict = Verdict::inefficient(
            ComplexityLabel::Quadratic,
            Confidence::High,
            TargetProducer::Coder,
            Some("use a hash map".to_string()),
        )
        .with_fit(2.0, 0.99);
        let json = serde_json::to_value(&verdict).unwrap();
        let back: Verdict = serde_json::from_value(json).unwrap();
        assert_eq!(back, verdict);

        let efficient = Verdict::efficient(ComplexityLabel::Linear, Confidence::Low);
        let json = serde_json::to_string(&efficient).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert!(back.is_efficient());
        assert!(back.patch().is_none());
    }

    #[test]
    fn test_perf_gain_is_clamped() {
        let mut verdict = Verdict::efficient(ComplexityLabel::Linear, Confidence::High);
        verdict.set_perf_gain(-0.4);
        assert_eq!(verdict.perf_gain(), 0.0);
        verdict.set_perf_gain(f64::NAN);
        assert_eq!(verdict.perf_gain(), 0.0);
        verdict.set_perf_gain(0.25);
        assert_eq!(verdict.perf_gain(), 0.25);
    }

    #[test]
    fn test_plan_max_bound() {
        let mut plan = Plan::default();
        assert_eq!(plan.max_bound(), None);
        plan.input_bounds.insert("n".to_string(), 100_000);
        plan.input_bounds.insert("m".to_string(), 500);
        assert_eq!(plan.max_bound(), Some(100_000));
    }
}
