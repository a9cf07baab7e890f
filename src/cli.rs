use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{runner, BatchRunner};
use crate::config::settings::Settings;
use crate::config::types::{ExecutionProfile, ProblemSpec};
use crate::config::validator::validate_settings;
use crate::controller::RunResult;
use crate::exec::telemetry::MeasurementTool;
use crate::exec::Sandbox;
use crate::pipeline::{Pipeline, RunScope};
use crate::producers::{CommandProducer, ProducerSet};
use crate::profiler::generator::generator_for;
use crate::profiler::ladder::SizeLadder;
use crate::profiler::Profiler;
use crate::verdict::{ComplexityClassifier, ComplexityOracle};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliMode {
    Compat,
    Judge,
}

impl CliMode {
    fn primary_binary(self) -> &'static str {
        match self {
            Self::Compat => "perfbox",
            Self::Judge => "perfbox-judge",
        }
    }

    fn mode_name(self) -> &'static str {
        match self {
            Self::Compat => "compat",
            Self::Judge => "judge",
        }
    }

    fn allows(self, command: &Commands) -> bool {
        match self {
            Self::Compat => true,
            Self::Judge => matches!(
                command,
                Commands::Solve { .. }
                    | Commands::Profile { .. }
                    | Commands::Classify { .. }
                    | Commands::CheckDeps { .. }
            ),
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON); defaults to ./perfbox.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full refinement loop on one task file
    Solve {
        /// Task JSON ({task_id, prompt, constraints, unit_tests})
        #[arg(long)]
        task: PathBuf,
        /// Write the result here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Seed forwarded to the producers
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Compile a source file and profile it across a size ladder
    Profile {
        /// Source file to compile
        #[arg(long)]
        source: PathBuf,
        /// Declared input bound used to derive the ladder
        #[arg(long)]
        bound: Option<u64>,
        /// Explicit ladder, comma separated (overrides --bound)
        #[arg(long, value_delimiter = ',')]
        sizes: Vec<u64>,
        /// Extra compiler flag (repeatable)
        #[arg(long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
        flags: Vec<String>,
        /// Input generator: size-echo or array-of-size (default from settings)
        #[arg(long)]
        generator: Option<String>,
        /// Generator seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Collect gprof hotspots
        #[arg(long)]
        debug: bool,
    },
    /// Classify a stored execution profile
    Classify {
        /// Profile JSON as written by `profile`
        #[arg(long)]
        profile: PathBuf,
        /// Escalate ambiguous series to the configured oracle command
        #[arg(long)]
        oracle: bool,
    },
    /// Run every task in a directory across seeds and repeats
    Batch {
        /// Directory with task JSON files (or an index.json)
        #[arg(long)]
        tasks: PathBuf,
        #[arg(long, default_value_t = 1)]
        seeds: u64,
        #[arg(long, default_value_t = 1)]
        runs: u32,
        /// Worker count (defaults to available parallelism, capped)
        #[arg(long)]
        workers: Option<usize>,
        /// Results directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Check that the toolchain and measurement tools are installed
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
    },
}

impl Commands {
    fn command_name(&self) -> &'static str {
        match self {
            Self::Solve { .. } => "solve",
            Self::Profile { .. } => "profile",
            Self::Classify { .. } => "classify",
            Self::Batch { .. } => "batch",
            Self::Serve { .. } => "serve",
            Self::CheckDeps { .. } => "check-deps",
        }
    }
}

fn validate_command_mode(mode: CliMode, command: &Commands) {
    if mode.allows(command) {
        return;
    }

    eprintln!(
        "Error: command '{}' is not available in '{}' mode",
        command.command_name(),
        mode.mode_name()
    );
    if mode == CliMode::Judge {
        eprintln!(
            "Use '{}' for long-running commands like 'batch' and 'serve'.",
            CliMode::Compat.primary_binary()
        );
    }

    std::process::exit(2);
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load(explicit).context("failed to load settings")?;
    let report = validate_settings(&settings);
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    if !report.is_valid() {
        for error in &report.errors {
            eprintln!("❌ {}", error);
        }
        anyhow::bail!("invalid settings ({} errors)", report.errors.len());
    }
    Ok(settings)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn emit_json<T: serde::Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub fn run(mode: CliMode) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    validate_command_mode(mode, &cli.command);
    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Solve { task, out, seed } => {
            let problem: ProblemSpec = read_json(&task)?;
            let producers = ProducerSet::from_settings(&settings.producers, seed)?;
            let oracle = producers
                .oracle
                .clone()
                .map(|o| o as Arc<dyn ComplexityOracle>);

            let outcome = Pipeline::new(&settings).solve(
                &problem,
                &producers.planner,
                &producers.coder,
                oracle,
                RunScope::new(seed.unwrap_or(0)),
            )?;
            let success = outcome.is_success();
            let result = RunResult::from(outcome);
            emit_json(&result, out.as_deref())?;

            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Profile {
            source,
            bound,
            sizes,
            flags,
            generator,
            seed,
            debug,
        } => {
            if debug {
                settings.sandbox.debug_hotspots = true;
            }
            let code = std::fs::read_to_string(&source)
                .with_context(|| format!("failed to read {}", source.display()))?;
            let generator = generator.unwrap_or_else(|| settings.sandbox.generator.clone());
            let input_generator = generator_for(&generator, seed)
                .ok_or_else(|| anyhow::anyhow!("unknown generator: {}", generator))?;

            let sandbox = Sandbox::from_settings(&settings)?;
            eprintln!(
                "Profiling {} with {}",
                source.display(),
                sandbox.executor().tool().describe()
            );
            let mut profiler = Profiler::new(sandbox, &settings)?.with_generator(input_generator);
            if !sizes.is_empty() {
                profiler = profiler.with_ladder(SizeLadder::new(sizes)?);
            }

            let profile = profiler.profile_source(&code, &flags, bound)?;
            emit_json(&profile, None)
        }
        Commands::Classify { profile, oracle } => {
            let profile: ExecutionProfile = read_json(&profile)?;
            let mut classifier = ComplexityClassifier::new(settings.classifier.clone());
            if oracle {
                let argv = settings
                    .producers
                    .oracle_cmd
                    .clone()
                    .filter(|argv| !argv.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("--oracle requires producers.oracle_cmd"))?;
                let producer = CommandProducer::new(
                    argv,
                    std::time::Duration::from_millis(settings.producers.timeout_ms()),
                );
                classifier = classifier.with_oracle(Arc::new(producer));
            }
            let verdict = classifier.classify(&profile)?;
            emit_json(&verdict, None)
        }
        Commands::Batch {
            tasks,
            seeds,
            runs,
            workers,
            out,
        } => {
            let problems = runner::load_tasks(&tasks)?;
            let mut batch = BatchRunner::new(&settings);
            if let Some(workers) = workers {
                batch = batch.with_workers(workers);
            }
            if let Some(out) = out {
                batch = batch.with_results_dir(out);
            }
            let summary = batch.run(&problems, seeds, runs)?;
            println!(
                "{} jobs: {} success, {} failed, {} pruned, {} agent failures",
                summary.total_jobs,
                summary.count("success"),
                summary.count("failed"),
                summary.count("static_prune_failed"),
                summary.count("agent_failure")
            );
            println!("Results in {}", summary.results_dir.display());
            Ok(())
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(crate::server::serve(settings))
        }
        Commands::CheckDeps { verbose } => check_dependencies(&settings, verbose, mode.primary_binary()),
    }
}

/// First line of `<cmd> <arg>` output, or `None` when it cannot run.
fn tool_version(cmd: &str, arg: &str) -> Option<String> {
    let output = std::process::Command::new(cmd).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    Some(text.lines().next().unwrap_or("").trim().to_string())
}

fn check_dependencies(settings: &Settings, verbose: bool, primary_binary: &str) -> Result<()> {
    println!("🔍 Checking toolchain dependencies...");
    println!();

    let mut all_ok = true;

    let compiler = &settings.toolchain.compiler;
    match tool_version(compiler, "--version") {
        Some(version) => {
            println!("✅ Compiler ({}) - OK", compiler);
            if verbose {
                println!("  {} -> {}", compiler, version);
            }
        }
        None => {
            println!("❌ Compiler ({}) - MISSING", compiler);
            all_ok = false;
        }
    }

    let tool = MeasurementTool::detect(settings.toolchain.time_tool.as_deref());
    if tool.is_fallback() {
        println!("⚠️  Measurement tool - FALLBACK ({})", tool.describe());
        if verbose {
            println!("  Install GNU time (/usr/bin/time) for instrumented memory readings");
        }
    } else {
        println!("✅ Measurement tool - OK");
        if verbose {
            println!("  {}", tool.describe());
        }
    }

    let gprof = &settings.toolchain.gprof;
    match tool_version(gprof, "--version") {
        Some(version) => {
            println!("✅ Profiler ({}) - OK", gprof);
            if verbose {
                println!("  {} -> {}", gprof, version);
            }
        }
        None => println!("⚠️  Profiler ({}) - MISSING (hotspots disabled)", gprof),
    }

    println!();

    if all_ok {
        println!("✅ perfbox is ready to use");
        if verbose {
            println!();
            println!("💡 Usage examples:");
            println!("  {} profile --source solution.cpp --bound 100000", primary_binary);
            println!("  {} solve --task task.json --out result.json", primary_binary);
        }
        Ok(())
    } else {
        println!("🔧 Install a C++ compiler, e.g.: sudo apt install build-essential g++");
        std::process::exit(1);
    }
}
