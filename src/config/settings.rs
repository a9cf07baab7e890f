/// Runtime settings loaded once at startup and passed by reference.
use crate::config::types::{JudgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "perfbox.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_iterations: u32,
    pub diminish_delta: f64,
    pub stall_patience: u32,
    pub max_agent_failures: u32,
    pub sandbox: SandboxSettings,
    pub toolchain: ToolchainSettings,
    pub classifier: ClassifierSettings,
    pub batch: BatchSettings,
    pub producers: ProducerSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            diminish_delta: 0.05,
            stall_patience: 1,
            max_agent_failures: 3,
            sandbox: SandboxSettings::default(),
            toolchain: ToolchainSettings::default(),
            classifier: ClassifierSettings::default(),
            batch: BatchSettings::default(),
            producers: ProducerSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub timeout_ms: u64,
    pub memory_mb: u64,
    pub stack_mb: Option<u64>,
    pub compile_timeout_ms: u64,
    pub scratch_root: PathBuf,
    pub binary_store: PathBuf,
    /// Largest ladder size regardless of the declared bound.
    pub max_size: u64,
    /// Explicit ladder; derived from the plan bound when empty.
    pub input_sizes: Vec<u64>,
    pub output_limit_bytes: usize,
    pub debug_hotspots: bool,
    /// Input generator name, seeded per run: `size-echo` or `array-of-size`.
    pub generator: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            timeout_ms: 2000,
            memory_mb: 512,
            stack_mb: Some(256),
            compile_timeout_ms: 30_000,
            scratch_root: tmp.join("perfbox").join("scratch"),
            binary_store: tmp.join("perfbox").join("bin"),
            max_size: 100_000,
            input_sizes: Vec::new(),
            output_limit_bytes: 1024 * 1024,
            debug_hotspots: false,
            generator: "size-echo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    pub language: String,
    pub compiler: String,
    pub optimization_flags: Vec<String>,
    pub profiling_flags: Vec<String>,
    /// Measurement tool override; detected when unset.
    pub time_tool: Option<PathBuf>,
    pub gprof: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            language: "cpp".to_string(),
            compiler: "g++".to_string(),
            optimization_flags: ["-O3", "-std=c++17", "-march=native", "-ffast-math"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            profiling_flags: vec!["-pg".to_string(), "-g".to_string()],
            time_tool: None,
            gprof: "gprof".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub min_points: usize,
    pub min_r_squared: f64,
    pub min_size_ratio: f64,
    pub monotonic_tolerance: f64,
    pub slope_floor: f64,
    pub slope_ceiling: f64,
    pub memory_growth_ratio: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_points: 3,
            min_r_squared: 0.7,
            min_size_ratio: 10.0,
            monotonic_tolerance: 0.10,
            slope_floor: -0.5,
            slope_ceiling: 10.0,
            memory_growth_ratio: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker override; derived from available parallelism when unset.
    pub max_workers: Option<usize>,
    pub worker_ceiling: usize,
    pub results_dir: PathBuf,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            worker_ceiling: 8,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl BatchSettings {
    pub fn effective_workers(&self) -> usize {
        if let Some(workers) = self.max_workers {
            return workers.max(1);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(self.worker_ceiling)
            .max(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub planner_cmd: Vec<String>,
    pub coder_cmd: Vec<String>,
    pub oracle_cmd: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
}

impl ProducerSettings {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(120_000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            JudgeError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            JudgeError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Defaults, then `explicit` or `./perfbox.json` if present, then env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::load_from_file(local)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `PERFBOX_*` overrides from a lookup function.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PERFBOX_MAX_ITERATIONS") {
            self.max_iterations = parse_override("PERFBOX_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("PERFBOX_DIMINISH_DELTA") {
            self.diminish_delta = parse_override("PERFBOX_DIMINISH_DELTA", &v)?;
        }
        if let Some(v) = lookup("PERFBOX_SANDBOX_TIMEOUT_MS") {
            self.sandbox.timeout_ms = parse_override("PERFBOX_SANDBOX_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PERFBOX_SANDBOX_MEMORY_MB") {
            self.sandbox.memory_mb = parse_override("PERFBOX_SANDBOX_MEMORY_MB", &v)?;
        }
        if let Some(v) = lookup("PERFBOX_MAX_WORKERS") {
            self.batch.max_workers = Some(parse_override("PERFBOX_MAX_WORKERS", &v)?);
        }
        if let Some(v) = lookup("PERFBOX_BIND") {
            self.server.bind = v;
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| JudgeError::Config(format!("invalid value for {}: {:?}", key, value)))
}
