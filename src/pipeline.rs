//! One-call wiring of sandbox, profiler, classifier and producers.

use crate::config::settings::Settings;
use crate::config::types::{JudgeError, ProblemSpec, Result};
use crate::controller::{
    Coder, Components, LoopLimits, PipelineOutcome, Planner, RefinementController, StaticPruner,
};
use crate::exec::telemetry::MeasurementTool;
use crate::exec::Sandbox;
use crate::profiler::generator::generator_for;
use crate::profiler::Profiler;
use crate::safety::workspace::NamespaceDirs;
use crate::verdict::{ComplexityClassifier, ComplexityOracle};
use std::sync::Arc;

/// Isolation and input seed for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunScope<'n> {
    /// Private scratch and binary-store sub-directory, removed when the run ends.
    pub namespace: Option<&'n str>,
    /// Seed for the configured input generator.
    pub seed: u64,
}

impl<'n> RunScope<'n> {
    pub fn new(seed: u64) -> Self {
        Self {
            namespace: None,
            seed,
        }
    }

    pub fn namespaced(namespace: &'n str, seed: u64) -> Self {
        Self {
            namespace: Some(namespace),
            seed,
        }
    }
}

/// Runs problems end to end against one settings snapshot.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    tool: MeasurementTool,
}

impl<'a> Pipeline<'a> {
    /// Detect the measurement tool once; it is shared by every run.
    pub fn new(settings: &'a Settings) -> Self {
        let tool = MeasurementTool::detect(settings.toolchain.time_tool.as_deref());
        log::info!("Measurement tool: {}", tool.describe());
        Self::with_tool(settings, tool)
    }

    pub fn with_tool(settings: &'a Settings, tool: MeasurementTool) -> Self {
        Self { settings, tool }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn tool(&self) -> &MeasurementTool {
        &self.tool
    }

    /// Solve one problem.
    pub fn solve(
        &self,
        problem: &ProblemSpec,
        planner: &dyn Planner,
        coder: &dyn Coder,
        oracle: Option<Arc<dyn ComplexityOracle>>,
        scope: RunScope<'_>,
    ) -> Result<PipelineOutcome> {
        let sandbox_settings = &self.settings.sandbox;
        let generator = generator_for(&sandbox_settings.generator, scope.seed).ok_or_else(|| {
            JudgeError::Config(format!(
                "unknown input generator: {}",
                sandbox_settings.generator
            ))
        })?;

        // Declared before the sandbox so it is dropped after it.
        let _namespace_dirs = scope.namespace.map(|ns| {
            NamespaceDirs::new(vec![
                sandbox_settings.scratch_root.join(ns),
                sandbox_settings.binary_store.join(ns),
            ])
        });

        let sandbox = Sandbox::with_tool(self.settings, self.tool.clone(), scope.namespace)?;
        let profiler = Profiler::new(sandbox, self.settings)?.with_generator(generator);
        let mut classifier = ComplexityClassifier::new(self.settings.classifier.clone());
        if let Some(oracle) = oracle {
            classifier = classifier.with_oracle(oracle);
        }
        let pruner = StaticPruner::default();

        let controller = RefinementController::new(
            LoopLimits::from_settings(self.settings),
            Components {
                planner,
                coder,
                pruner: &pruner,
                profiler: &profiler,
                analyzer: &classifier,
            },
        );
        Ok(controller.run(problem))
    }
}
