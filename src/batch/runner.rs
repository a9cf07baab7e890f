//! Batch runner
//!
//! Expands tasks into `(task, seed, run)` jobs, runs them on the worker pool
//! and persists one JSON record per job plus a per-task index.

use crate::config::settings::Settings;
use crate::config::types::{Constraints, JudgeError, ProblemSpec, Result};
use crate::batch::pool::WorkerPool;
use crate::controller::RunResult;
use crate::observability::metrics::PipelineMetrics;
use crate::pipeline::{Pipeline, RunScope};
use crate::producers::ProducerSet;
use crate::verdict::ComplexityOracle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task_index: usize,
    pub seed: u64,
    pub run_id: u32,
}

/// Persisted result of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub task_id: String,
    pub seed: u64,
    pub run_id: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: RunResult,
}

impl RunRecord {
    pub fn status(&self) -> &'static str {
        match &self.result {
            RunResult::Success { .. } => "success",
            RunResult::StaticPruneFailed { .. } => "static_prune_failed",
            RunResult::AgentFailure { .. } => "agent_failure",
            RunResult::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub constraints: Constraints,
    pub jobs: usize,
    pub statuses: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub generated_at: DateTime<Utc>,
    pub results_dir: PathBuf,
    pub total_jobs: usize,
    pub tasks: Vec<TaskSummary>,
}

impl BatchSummary {
    pub fn count(&self, status: &str) -> usize {
        self.tasks
            .iter()
            .map(|t| t.statuses.get(status).copied().unwrap_or(0))
            .sum()
    }
}

#[derive(Deserialize)]
struct TaskIndex {
    tasks: Vec<TaskEntry>,
}

#[derive(Deserialize)]
struct TaskEntry {
    file: PathBuf,
}

/// Load tasks from `dir`: the files listed in `index.json` when present,
/// else every `*.json` file in name order.
pub fn load_tasks(dir: &Path) -> Result<Vec<ProblemSpec>> {
    let index_path = dir.join("index.json");
    let files: Vec<PathBuf> = if index_path.is_file() {
        let index: TaskIndex = serde_json::from_str(&fs::read_to_string(&index_path)?)?;
        index.tasks.into_iter().map(|t| dir.join(t.file)).collect()
    } else {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
    };

    let mut tasks = Vec::with_capacity(files.len());
    // Result directories and run namespaces are keyed by the sanitized id.
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for file in files {
        let content = fs::read_to_string(&file)?;
        let task: ProblemSpec = serde_json::from_str(&content).map_err(|e| {
            JudgeError::Config(format!("invalid task file {}: {}", file.display(), e))
        })?;
        if let Some(prior) = seen.insert(sanitize(&task.task_id), task.task_id.clone()) {
            return Err(JudgeError::Config(format!(
                "task id {:?} in {} collides with {:?}",
                task.task_id,
                file.display(),
                prior
            )));
        }
        tasks.push(task);
    }
    if tasks.is_empty() {
        return Err(JudgeError::Config(format!(
            "no tasks found in {}",
            dir.display()
        )));
    }
    log::info!("Loaded {} tasks from {}", tasks.len(), dir.display());
    Ok(tasks)
}

/// Expand tasks into jobs for seeds `0..seeds` and runs `0..runs`.
pub fn expand_jobs(task_count: usize, seeds: u64, runs: u32) -> Vec<Job> {
    let mut jobs = Vec::new();
    for task_index in 0..task_count {
        for seed in 0..seeds {
            for run_id in 0..runs {
                jobs.push(Job {
                    task_index,
                    seed,
                    run_id,
                });
            }
        }
    }
    jobs
}

/// `<results>/<task_id>/seed_<seed>/run_<run_id>.json`
pub fn record_path(results_dir: &Path, task_id: &str, seed: u64, run_id: u32) -> PathBuf {
    results_dir
        .join(sanitize(task_id))
        .join(format!("seed_{}", seed))
        .join(format!("run_{}.json", run_id))
}

fn sanitize(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Runs one job and returns its wire result.
pub type JobFn<'a> = dyn Fn(&ProblemSpec, &Job) -> RunResult + Sync + 'a;

pub struct BatchRunner<'a> {
    settings: &'a Settings,
    results_dir: PathBuf,
    workers: usize,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            results_dir: settings.batch.results_dir.clone(),
            workers: settings.batch.effective_workers(),
            metrics: None,
        }
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every task through the full pipeline with command producers.
    pub fn run(&self, tasks: &[ProblemSpec], seeds: u64, runs: u32) -> Result<BatchSummary> {
        let pipeline = Pipeline::new(self.settings);
        let metrics = self.metrics.clone();
        let solve = |task: &ProblemSpec, job: &Job| -> RunResult {
            let started = Instant::now();
            let namespace = format!("{}-s{}-r{}", sanitize(&task.task_id), job.seed, job.run_id);
            let outcome = ProducerSet::from_settings(&self.settings.producers, Some(job.seed))
                .and_then(|producers| {
                    let oracle = producers
                        .oracle
                        .clone()
                        .map(|o| o as Arc<dyn ComplexityOracle>);
                    pipeline.solve(
                        task,
                        &producers.planner,
                        &producers.coder,
                        oracle,
                        RunScope::namespaced(&namespace, job.seed),
                    )
                });
            match outcome {
                Ok(outcome) => {
                    if let Some(metrics) = &metrics {
                        metrics.record_outcome(&outcome, started.elapsed());
                    }
                    outcome.into()
                }
                Err(e) => {
                    if let Some(metrics) = &metrics {
                        metrics.record_error(started.elapsed());
                    }
                    RunResult::AgentFailure {
                        error: e.to_string(),
                        details: format!("job {} could not start", namespace),
                    }
                }
            }
        };
        self.run_with(tasks, seeds, runs, &solve)
    }

    /// Run jobs through `solve` and persist the results.
    pub fn run_with(
        &self,
        tasks: &[ProblemSpec],
        seeds: u64,
        runs: u32,
        solve: &JobFn<'_>,
    ) -> Result<BatchSummary> {
        fs::create_dir_all(&self.results_dir)?;
        let jobs = expand_jobs(tasks.len(), seeds.max(1), runs.max(1));
        let total_jobs = jobs.len();
        log::info!(
            "Running {} jobs ({} tasks) on {} workers",
            total_jobs,
            tasks.len(),
            self.workers
        );

        let pool = WorkerPool::new(self.workers);
        let outcomes = pool.run(jobs, |job: Job| {
            let task = &tasks[job.task_index];
            let started_at = Utc::now();
            let started = Instant::now();
            let result = solve(task, &job);
            let record = RunRecord {
                task_id: task.task_id.clone(),
                seed: job.seed,
                run_id: job.run_id,
                started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                result,
            };
            let persisted = self.persist(&record);
            (job.task_index, record.status(), persisted)
        });

        let mut tasks_summary: Vec<TaskSummary> = tasks
            .iter()
            .map(|t| TaskSummary {
                task_id: t.task_id.clone(),
                constraints: t.constraints,
                jobs: 0,
                statuses: BTreeMap::new(),
            })
            .collect();
        for (task_index, status, persisted) in outcomes {
            persisted?;
            let summary = &mut tasks_summary[task_index];
            summary.jobs += 1;
            *summary.statuses.entry(status.to_string()).or_insert(0) += 1;
        }

        let summary = BatchSummary {
            generated_at: Utc::now(),
            results_dir: self.results_dir.clone(),
            total_jobs,
            tasks: tasks_summary,
        };
        fs::write(
            self.results_dir.join("index.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;
        log::info!(
            "Batch finished: {} success, {} failed, {} pruned, {} agent failures",
            summary.count("success"),
            summary.count("failed"),
            summary.count("static_prune_failed"),
            summary.count("agent_failure")
        );
        Ok(summary)
    }

    fn persist(&self, record: &RunRecord) -> Result<()> {
        let path = record_path(&self.results_dir, &record.task_id, record.seed, record.run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}
