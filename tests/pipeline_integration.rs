//! Refinement loop routing with scripted producers, plus one end-to-end run
//! through the real sandbox and classifier.

mod common;

use perfbox::controller::{
    Analyzer, Coder, Components, FailureReason, GeneratedCode, LoopLimits, PipelineOutcome,
    PlanFeedback, Planner, Profiling, RefinementController, RunResult, StaticPruner,
};
use perfbox::exec::telemetry::MeasurementTool;
use perfbox::pipeline::{Pipeline, RunScope};
use perfbox::{
    Candidate, ComplexityLabel, Confidence, Constraints, ExecutionProfile, JudgeError, Phase, Plan,
    ProblemSpec, Result, TargetProducer, Verdict,
};
use std::collections::VecDeque;
use std::sync::Mutex;

fn problem() -> ProblemSpec {
    ProblemSpec {
        task_id: "pair-sum".to_string(),
        prompt: "Count pairs summing to k".to_string(),
        constraints: Constraints::default(),
        unit_tests: Vec::new(),
    }
}

fn limits() -> LoopLimits {
    LoopLimits {
        max_iterations: 3,
        diminish_delta: 0.05,
        stall_patience: 1,
        max_agent_failures: 3,
    }
}

struct ScriptedPlanner {
    algorithm: String,
    feedback: Mutex<Vec<Option<PlanFeedback>>>,
}

impl ScriptedPlanner {
    fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            feedback: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Option<PlanFeedback>> {
        self.feedback.lock().unwrap().clone()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _problem: &ProblemSpec, feedback: Option<&PlanFeedback>) -> Result<Plan> {
        self.feedback.lock().unwrap().push(feedback.cloned());
        let mut plan = Plan {
            algorithm: self.algorithm.clone(),
            ..Plan::default()
        };
        plan.input_bounds.insert("n".to_string(), 100_000);
        Ok(plan)
    }
}

/// Returns canned results in order; the last one repeats.
struct ScriptedCoder {
    results: Mutex<VecDeque<Result<GeneratedCode>>>,
    patches: Mutex<Vec<Option<String>>>,
}

impl ScriptedCoder {
    fn ok() -> Self {
        Self::with(Vec::new())
    }

    fn with(results: Vec<Result<GeneratedCode>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            patches: Mutex::new(Vec::new()),
        }
    }

    fn patches(&self) -> Vec<Option<String>> {
        self.patches.lock().unwrap().clone()
    }
}

impl Coder for ScriptedCoder {
    fn generate(
        &self,
        _problem: &ProblemSpec,
        _plan: &Plan,
        patch: Option<&str>,
    ) -> Result<GeneratedCode> {
        self.patches.lock().unwrap().push(patch.map(str::to_string));
        let n = self.patches.lock().unwrap().len();
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(GeneratedCode {
                source: format!("// version {}", n),
                compiler_flags: Vec::new(),
            }),
        }
    }
}

struct ScriptedProfiler {
    results: Mutex<VecDeque<Result<f64>>>,
}

impl ScriptedProfiler {
    /// Each entry is the worst-case runtime of one profile, or an error.
    fn new(results: Vec<Result<f64>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

impl Profiling for ScriptedProfiler {
    fn profile(&self, _candidate: &Candidate, _plan: &Plan) -> Result<ExecutionProfile> {
        let worst = self.results.lock().unwrap().pop_front().unwrap_or(Ok(100.0))?;
        ExecutionProfile::from_series(vec![1000, 10000], vec![worst / 10.0, worst], vec![1.0, 1.0])
    }
}

struct ScriptedAnalyzer {
    verdicts: Mutex<VecDeque<Verdict>>,
}

impl ScriptedAnalyzer {
    fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
        }
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&self, _profile: &ExecutionProfile) -> Result<Verdict> {
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| quadratic()))
    }
}

fn linear() -> Verdict {
    Verdict::efficient(ComplexityLabel::Linear, Confidence::High)
}

fn quadratic() -> Verdict {
    Verdict::inefficient(
        ComplexityLabel::Quadratic,
        Confidence::High,
        TargetProducer::Coder,
        Some("remove the inner loop".to_string()),
    )
}

fn unknown() -> Verdict {
    Verdict::inefficient(ComplexityLabel::Unknown, Confidence::Low, TargetProducer::Planner, None)
}

fn run(
    planner: &ScriptedPlanner,
    coder: &ScriptedCoder,
    profiler: &ScriptedProfiler,
    analyzer: &ScriptedAnalyzer,
) -> PipelineOutcome {
    let pruner = StaticPruner::default();
    RefinementController::new(
        limits(),
        Components {
            planner,
            coder,
            pruner: &pruner,
            profiler,
            analyzer,
        },
    )
    .run(&problem())
}

#[test]
fn test_efficient_first_iteration_succeeds() {
    let planner = ScriptedPlanner::new("hash map single pass");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![Ok(40.0)]),
        &ScriptedAnalyzer::new(vec![linear()]),
    );

    match outcome {
        PipelineOutcome::Success {
            candidate,
            verdict,
            iterations,
            ..
        } => {
            assert_eq!(iterations, 1);
            assert_eq!(candidate.iteration, 1);
            assert_eq!(candidate.source, "// version 1");
            assert!(verdict.is_efficient());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(planner.calls(), vec![None]);
}

#[test]
fn test_coder_target_patches_then_succeeds() {
    let planner = ScriptedPlanner::new("two nested loops over pairs");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![Ok(800.0), Ok(50.0)]),
        &ScriptedAnalyzer::new(vec![quadratic(), linear()]),
    );

    match outcome {
        PipelineOutcome::Success {
            candidate,
            verdict,
            iterations,
            ..
        } => {
            assert_eq!(iterations, 2);
            assert_eq!(candidate.note.as_deref(), Some("patched"));
            // (800 - 50) / 800
            assert!((verdict.perf_gain() - 0.9375).abs() < 1e-9);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(
        coder.patches(),
        vec![None, Some("remove the inner loop".to_string())]
    );
    assert_eq!(planner.calls().len(), 1);
}

#[test]
fn test_planner_target_replans_with_feedback() {
    let planner = ScriptedPlanner::new("brute force");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![Ok(900.0), Ok(30.0)]),
        &ScriptedAnalyzer::new(vec![unknown(), linear()]),
    );

    match outcome {
        PipelineOutcome::Success { candidate, .. } => {
            assert_eq!(candidate.note.as_deref(), Some("replanned"))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let calls = planner.calls();
    assert_eq!(calls.len(), 2);
    let feedback = calls[1].clone().unwrap();
    assert_eq!(feedback.previous_algorithm, "brute force");
    assert_eq!(feedback.observed_complexity, ComplexityLabel::Unknown);
    assert_eq!(feedback.required_ceiling, ComplexityLabel::Linearithmic);
    assert_eq!(feedback.worst_runtime_ms, Some(900.0));
    assert_eq!(feedback.runtime_limit_ms, 2000);
    // A replan never carries a patch.
    assert_eq!(coder.patches(), vec![None, None]);
}

#[test]
fn test_convergence_stall_stops_the_loop() {
    let planner = ScriptedPlanner::new("two nested loops");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![Ok(500.0), Ok(490.0)]),
        &ScriptedAnalyzer::new(vec![quadratic(), quadratic()]),
    );

    match outcome {
        PipelineOutcome::Failed {
            reason,
            last_verdict,
            attempts,
        } => {
            match reason {
                FailureReason::ConvergenceStall { gain } => assert!((gain - 0.02).abs() < 1e-9),
                other => panic!("unexpected reason: {:?}", other),
            }
            assert_eq!(last_verdict.unwrap().complexity(), ComplexityLabel::Quadratic);
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[1].worst_runtime_ms, Some(490.0));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_iteration_cap_stops_the_loop() {
    let planner = ScriptedPlanner::new("two nested loops");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![Ok(800.0), Ok(400.0), Ok(200.0), Ok(100.0)]),
        &ScriptedAnalyzer::new(Vec::new()),
    );

    match outcome {
        PipelineOutcome::Failed {
            reason, attempts, ..
        } => {
            assert_eq!(reason, FailureReason::IterationCap { max_iterations: 3 });
            assert_eq!(attempts.len(), 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    // Exactly three candidates were generated.
    assert_eq!(coder.patches().len(), 3);
}

#[test]
fn test_repeated_coder_failure_aborts_naming_phase() {
    let planner = ScriptedPlanner::new("hash map");
    let failure = || {
        Err(JudgeError::Producer {
            phase: Phase::Coding,
            message: "timed out".to_string(),
        })
    };
    let coder = ScriptedCoder::with(vec![failure(), failure(), failure()]);
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(Vec::new()),
        &ScriptedAnalyzer::new(Vec::new()),
    );

    match &outcome {
        PipelineOutcome::AgentFailure { phase, details, .. } => {
            assert_eq!(*phase, Phase::Coding);
            assert!(details.contains("3 producer failures"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    match RunResult::from(outcome) {
        RunResult::AgentFailure { error, .. } => assert!(error.starts_with("coding failed")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_compile_error_retries_from_coding() {
    let planner = ScriptedPlanner::new("hash map");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(vec![
            Err(JudgeError::Compile {
                diagnostics: "attempt 2: error".to_string(),
            }),
            Ok(20.0),
        ]),
        &ScriptedAnalyzer::new(vec![linear()]),
    );

    match outcome {
        PipelineOutcome::Success {
            candidate,
            iterations,
            ..
        } => {
            assert_eq!(iterations, 1);
            assert_eq!(candidate.source, "// version 2");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_pruned_plan_never_reaches_coder() {
    let planner = ScriptedPlanner::new("Triple nested loop over every triple");
    let coder = ScriptedCoder::ok();
    let outcome = run(
        &planner,
        &coder,
        &ScriptedProfiler::new(Vec::new()),
        &ScriptedAnalyzer::new(Vec::new()),
    );

    match RunResult::from(outcome) {
        RunResult::StaticPruneFailed { rule, .. } => assert_eq!(rule, "deep_loop_nesting"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(coder.patches().is_empty());
}

#[test]
fn test_end_to_end_constant_program() {
    let scratch = common::Scratch::new("e2e");
    let compiler = common::copy_compiler(&scratch);
    let mut settings = scratch.settings(&compiler);
    settings.sandbox.input_sizes = vec![0, 1, 1000, 5000, 10000];

    let planner = ScriptedPlanner::new("read n and print it");
    let coder = ScriptedCoder::with(vec![Ok(GeneratedCode {
        source: common::ECHO_PROGRAM.to_string(),
        compiler_flags: Vec::new(),
    })]);

    let outcome = Pipeline::with_tool(&settings, MeasurementTool::HostClock)
        .solve(&problem(), &planner, &coder, None, RunScope::namespaced("e2e", 0))
        .unwrap();

    match RunResult::from(outcome) {
        RunResult::Success {
            code,
            profile,
            verdict,
            iterations,
        } => {
            assert_eq!(code, common::ECHO_PROGRAM);
            assert_eq!(iterations, 1);
            assert_eq!(profile.input_sizes(), [0, 1, 1000, 5000, 10000]);
            assert_eq!(profile.failed_points(), 0);
            assert!(profile.runtime_ms()[0] > 0.0);
            assert_eq!(verdict.complexity(), ComplexityLabel::Constant);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(!settings.sandbox.scratch_root.join("e2e").exists());
    assert!(!settings.sandbox.binary_store.join("e2e").exists());
}

#[test]
fn test_namespace_removed_when_run_fails() {
    let scratch = common::Scratch::new("ns-fail");
    let settings = scratch.settings(std::path::Path::new("/nonexistent/perfbox-cxx"));

    let planner = ScriptedPlanner::new("read n and print it");
    let coder = ScriptedCoder::with(Vec::new());

    let outcome = Pipeline::with_tool(&settings, MeasurementTool::HostClock)
        .solve(&problem(), &planner, &coder, None, RunScope::namespaced("job-7", 1))
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::AgentFailure { .. }));
    assert!(settings.sandbox.scratch_root.exists());
    assert!(!settings.sandbox.scratch_root.join("job-7").exists());
    assert!(!settings.sandbox.binary_store.join("job-7").exists());
}

#[test]
fn test_configured_generator_feeds_the_program() {
    let scratch = common::Scratch::new("array");
    let compiler = common::copy_compiler(&scratch);
    let mut settings = scratch.settings(&compiler);
    settings.sandbox.generator = "array-of-size".to_string();
    settings.sandbox.input_sizes = vec![0, 1, 10, 100];

    let planner = ScriptedPlanner::new("count the array");
    let coder = ScriptedCoder::with(vec![Ok(GeneratedCode {
        source: common::ARRAY_PROGRAM.to_string(),
        compiler_flags: Vec::new(),
    })]);

    let outcome = Pipeline::with_tool(&settings, MeasurementTool::HostClock)
        .solve(&problem(), &planner, &coder, None, RunScope::new(42))
        .unwrap();

    match outcome {
        PipelineOutcome::Success { profile, .. } => {
            assert_eq!(profile.failed_points(), 0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_unknown_generator_is_config_error() {
    let scratch = common::Scratch::new("bad-gen");
    let compiler = common::copy_compiler(&scratch);
    let mut settings = scratch.settings(&compiler);
    settings.sandbox.generator = "graph".to_string();

    let planner = ScriptedPlanner::new("anything");
    let coder = ScriptedCoder::with(Vec::new());
    let result = Pipeline::with_tool(&settings, MeasurementTool::HostClock).solve(
        &problem(),
        &planner,
        &coder,
        None,
        RunScope::default(),
    );
    assert!(matches!(result, Err(JudgeError::Config(_))));
}
