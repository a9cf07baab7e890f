use crate::config::types::{CompiledBinary, JudgeError, Result};
use crate::exec::process::{self, ProcessSpec};
use crate::judge::{merge_flags, ToolchainAdapter};
use crate::safety::binary_store::BinaryStore;
use crate::safety::workspace::WorkspaceManager;
use std::time::Duration;

const COMPILE_ATTEMPTS: u32 = 2;

/// Compiles candidates in scratch workspaces and caches the result.
pub struct Compiler {
    adapter: Box<dyn ToolchainAdapter>,
    workspaces: WorkspaceManager,
    store: BinaryStore,
    timeout: Duration,
}

impl Compiler {
    pub fn new(
        adapter: Box<dyn ToolchainAdapter>,
        workspaces: WorkspaceManager,
        store: BinaryStore,
        timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            workspaces,
            store,
            timeout,
        }
    }

    pub fn adapter(&self) -> &dyn ToolchainAdapter {
        self.adapter.as_ref()
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Build `source` with the adapter's flags plus `extra_flags`.
    ///
    /// A failed build is retried once; the error carries the second
    /// attempt's diagnostics. A store hit skips the toolchain entirely.
    pub fn compile(&self, source: &str, extra_flags: &[String]) -> Result<CompiledBinary> {
        let flags = merge_flags(self.adapter.base_flags(), extra_flags);
        let key = BinaryStore::key(self.adapter.language(), &flags, source);

        if let Some(path) = self.store.lookup(&key) {
            log::debug!("Binary store hit {}", &key[..12]);
            return Ok(CompiledBinary {
                path,
                store_key: key,
                reused: true,
            });
        }

        let mut diagnostics = String::new();
        for attempt in 1..=COMPILE_ATTEMPTS {
            match self.build_once(source, extra_flags, &key) {
                Ok(binary) => return Ok(binary),
                Err(text) => {
                    log::warn!("Compile attempt {}/{} failed", attempt, COMPILE_ATTEMPTS);
                    diagnostics = format!("attempt {}: {}", attempt, text);
                }
            }
        }
        Err(JudgeError::Compile { diagnostics })
    }

    fn build_once(
        &self,
        source: &str,
        extra_flags: &[String],
        key: &str,
    ) -> std::result::Result<CompiledBinary, String> {
        let mut workspace = self.workspaces.create_workspace().map_err(|e| e.to_string())?;
        let source_path = workspace
            .create_source_file(self.adapter.source_extension(), source.as_bytes())
            .map_err(|e| e.to_string())?;
        let output = workspace.create_binary_path("solution");
        let argv = self.adapter.compile_command(&source_path, &output, extra_flags);

        let mut spec = ProcessSpec::new(argv, self.timeout).with_workdir(workspace.run_dir());
        spec.output_limit = 256 * 1024;
        let outcome = process::run(&spec).map_err(|e| e.to_string())?;

        if outcome.timed_out {
            return Err(format!("compiler exceeded {} ms", self.timeout.as_millis()));
        }
        if !outcome.success() || !output.is_file() {
            let stderr = outcome.stderr_lossy();
            return Err(if stderr.trim().is_empty() {
                format!("compiler exited with {:?}", outcome.exit_code)
            } else {
                stderr
            });
        }

        let path = self.store.insert(key, &output).map_err(|e| e.to_string())?;
        log::info!(
            "Compiled {} in {:?} ({})",
            self.adapter.language(),
            outcome.wall,
            &key[..12]
        );
        Ok(CompiledBinary {
            path,
            store_key: key.to_string(),
            reused: false,
        })
    }
}
