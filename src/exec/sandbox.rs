use crate::config::settings::Settings;
use crate::config::types::{CompiledBinary, ExecError, Result};
use crate::exec::compiler::Compiler;
use crate::exec::executor::{ProcessExecutor, RunLimits, RunTelemetry};
use crate::exec::telemetry::MeasurementTool;
use crate::judge::registry::adapter_for;
use crate::safety::binary_store::BinaryStore;
use crate::safety::workspace::WorkspaceManager;
use std::time::Duration;

/// Compile once, run many: the execution boundary for candidate programs.
pub struct Sandbox {
    compiler: Compiler,
    executor: ProcessExecutor,
}

impl Sandbox {
    pub fn new(compiler: Compiler, executor: ProcessExecutor) -> Self {
        Self { compiler, executor }
    }

    /// Build a sandbox from settings, probing for the measurement tool.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tool = MeasurementTool::detect(settings.toolchain.time_tool.as_deref());
        Self::with_tool(settings, tool, None)
    }

    /// Build a sandbox whose scratch space and binary store are private to `namespace`.
    pub fn with_tool(
        settings: &Settings,
        tool: MeasurementTool,
        namespace: Option<&str>,
    ) -> Result<Self> {
        let sandbox = &settings.sandbox;
        let (scratch_root, store) = match namespace {
            Some(ns) => (
                sandbox.scratch_root.join(ns),
                BinaryStore::new(sandbox.binary_store.clone())?.namespace(ns)?,
            ),
            None => (
                sandbox.scratch_root.clone(),
                BinaryStore::new(sandbox.binary_store.clone())?,
            ),
        };
        let workspaces = WorkspaceManager::new(scratch_root.clone())?;
        let compiler = Compiler::new(
            adapter_for(&settings.toolchain)?,
            workspaces,
            store,
            Duration::from_millis(sandbox.compile_timeout_ms),
        );
        let executor = ProcessExecutor::new(tool, scratch_root, RunLimits::from_settings(sandbox));
        Ok(Self::new(compiler, executor))
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    pub fn compile(&self, source: &str, flags: &[String]) -> Result<CompiledBinary> {
        self.compiler.compile(source, flags)
    }

    pub fn execute(
        &self,
        binary: &CompiledBinary,
        input: &str,
    ) -> std::result::Result<RunTelemetry, ExecError> {
        let argv = self.compiler.adapter().run_command(&binary.path);
        self.executor.execute(&argv, input)
    }
}
