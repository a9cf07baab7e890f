/// Single measured execution of a compiled binary.
use crate::config::settings::SandboxSettings;
use crate::config::types::{ExecError, Fidelity, TelemetryEstimate};
use crate::exec::process::{self, ProcessSpec};
use crate::exec::telemetry::{self, MeasurementTool};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunLimits {
    pub timeout: Duration,
    pub memory_mb: u64,
    pub stack_mb: Option<u64>,
    pub output_limit: usize,
}

impl RunLimits {
    pub fn from_settings(sandbox: &SandboxSettings) -> Self {
        Self {
            timeout: Duration::from_millis(sandbox.timeout_ms),
            memory_mb: sandbox.memory_mb,
            stack_mb: sandbox.stack_mb,
            output_limit: sandbox.output_limit_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunTelemetry {
    pub stdout: String,
    pub wallclock_ms: f64,
    pub peak_rss_mb: f64,
    pub fidelity: Fidelity,
}

/// Runs binaries under the configured instrument and limits.
pub struct ProcessExecutor {
    tool: MeasurementTool,
    scratch_dir: PathBuf,
    limits: RunLimits,
}

impl ProcessExecutor {
    pub fn new(tool: MeasurementTool, scratch_dir: PathBuf, limits: RunLimits) -> Self {
        Self {
            tool,
            scratch_dir,
            limits,
        }
    }

    pub fn tool(&self) -> &MeasurementTool {
        &self.tool
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    /// Execute `argv` with `input` on stdin.
    pub fn execute(&self, argv: &[String], input: &str) -> Result<RunTelemetry, ExecError> {
        let stats_file = self
            .scratch_dir
            .join(format!("time-{}.txt", uuid::Uuid::new_v4()));
        let result = self.execute_with_stats(argv, input, &stats_file);
        let _ = std::fs::remove_file(&stats_file);
        result
    }

    fn execute_with_stats(
        &self,
        argv: &[String],
        input: &str,
        stats_file: &std::path::Path,
    ) -> Result<RunTelemetry, ExecError> {
        let mut spec = ProcessSpec::new(self.tool.wrap(argv, stats_file), self.limits.timeout)
            .with_stdin(input.as_bytes().to_vec());
        spec.memory_limit_bytes = Some(self.limits.memory_mb * 1024 * 1024);
        spec.stack_limit_bytes = self.limits.stack_mb.map(|mb| mb * 1024 * 1024);
        spec.output_limit = self.limits.output_limit;

        let outcome = process::run(&spec)?;
        let host_wall_ms = outcome.wall.as_secs_f64() * 1000.0;

        if outcome.timed_out {
            return Err(ExecError::Timeout {
                limit_ms: self.limits.timeout.as_millis() as u64,
            });
        }

        let report = match &self.tool {
            MeasurementTool::GnuTime { .. } => std::fs::read_to_string(stats_file).unwrap_or_default(),
            MeasurementTool::BsdTime { .. } => outcome.stderr_lossy(),
            MeasurementTool::HostClock => String::new(),
        };

        if !outcome.success() {
            let signal = outcome
                .signal
                .or_else(|| telemetry::gnu_terminating_signal(&report));
            let stderr = match &self.tool {
                MeasurementTool::BsdTime { .. } => telemetry::strip_bsd_report(&report),
                _ => outcome.stderr_lossy(),
            };
            return Err(ExecError::Crash {
                exit_code: outcome.exit_code,
                signal,
                stderr: tail(&stderr, 2048),
            });
        }

        let stdout = outcome.stdout_lossy();
        if self.tool.is_fallback() {
            return Ok(RunTelemetry {
                stdout,
                wallclock_ms: host_wall_ms,
                peak_rss_mb: outcome.peak_rss_mb.unwrap_or(0.0),
                fidelity: Fidelity::Fallback,
            });
        }

        match self.tool.parse(&report) {
            Ok(reading) => Ok(RunTelemetry {
                stdout,
                // Instrument resolution is 10 ms; a zero reading means "below resolution".
                wallclock_ms: if reading.wallclock_ms > 0.0 {
                    reading.wallclock_ms
                } else {
                    host_wall_ms
                },
                peak_rss_mb: reading.peak_rss_mb,
                fidelity: Fidelity::Instrumented,
            }),
            Err(reason) => Err(ExecError::TelemetryParse {
                reason,
                estimate: TelemetryEstimate {
                    stdout,
                    wallclock_ms: host_wall_ms,
                    peak_rss_mb: outcome.peak_rss_mb.unwrap_or(0.0),
                },
            }),
        }
    }
}

fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
