//! JSON-over-stdio producers.
//!
//! Each call spawns the configured command, writes a single JSON request to its
//! stdin and reads the answer from stdout. The process is bounded by the same
//! wall-clock machinery as candidate runs.

use crate::config::settings::ProducerSettings;
use crate::config::types::{JudgeError, Phase, Plan, ProblemSpec, Result};
use crate::controller::producers::{Coder, GeneratedCode, PlanFeedback, Planner};
use crate::exec::process::{self, ProcessSpec};
use crate::verdict::oracle::{ComplexityOracle, SeriesSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Request<'a> {
    Plan {
        problem: &'a ProblemSpec,
        #[serde(skip_serializing_if = "Option::is_none")]
        feedback: Option<&'a PlanFeedback>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    Code {
        problem: &'a ProblemSpec,
        plan: &'a Plan,
        #[serde(skip_serializing_if = "Option::is_none")]
        patch: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    Classify {
        summary: &'a SeriesSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
}

#[derive(Deserialize)]
struct LabelReply {
    label: String,
}

/// External command acting as planner, coder or oracle.
#[derive(Debug, Clone)]
pub struct CommandProducer {
    argv: Vec<String>,
    timeout: Duration,
    seed: Option<u64>,
}

impl CommandProducer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            timeout,
            seed: None,
        }
    }

    /// Seed forwarded with every request so producers can be made repeatable.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn call(&self, phase: Phase, request: &Request<'_>) -> Result<String> {
        let fail = |message: String| JudgeError::Producer { phase, message };
        if self.argv.is_empty() {
            return Err(fail("no command configured".to_string()));
        }

        let payload = serde_json::to_vec(request)?;
        log::debug!("{} request to {} ({} bytes)", phase, self.argv[0], payload.len());
        let spec = ProcessSpec::new(self.argv.clone(), self.timeout).with_stdin(payload);
        let outcome = process::run(&spec).map_err(|e| fail(e.to_string()))?;

        if outcome.timed_out {
            return Err(fail(format!(
                "{} timed out after {} ms",
                self.argv[0],
                self.timeout.as_millis()
            )));
        }
        if !outcome.success() {
            let stderr = outcome.stderr_lossy();
            return Err(fail(format!(
                "{} exited with {:?} (signal {:?}): {}",
                self.argv[0],
                outcome.exit_code,
                outcome.signal,
                stderr.trim()
            )));
        }

        let stdout = outcome.stdout_lossy();
        if stdout.trim().is_empty() {
            return Err(fail("empty response".to_string()));
        }
        Ok(stdout)
    }
}

impl Planner for CommandProducer {
    fn plan(&self, problem: &ProblemSpec, feedback: Option<&PlanFeedback>) -> Result<Plan> {
        let phase = if feedback.is_some() {
            Phase::Replanning
        } else {
            Phase::Planning
        };
        let reply = self.call(
            phase,
            &Request::Plan {
                problem,
                feedback,
                seed: self.seed,
            },
        )?;
        serde_json::from_str(reply.trim()).map_err(|e| JudgeError::Producer {
            phase,
            message: format!("invalid plan: {}", e),
        })
    }
}

impl Coder for CommandProducer {
    fn generate(
        &self,
        problem: &ProblemSpec,
        plan: &Plan,
        patch: Option<&str>,
    ) -> Result<GeneratedCode> {
        let reply = self.call(
            Phase::Coding,
            &Request::Code {
                problem,
                plan,
                patch,
                seed: self.seed,
            },
        )?;
        Ok(parse_code_reply(&reply))
    }
}

impl ComplexityOracle for CommandProducer {
    fn classify_ambiguous(&self, summary: &SeriesSummary) -> Result<String> {
        let reply = self
            .call(
                Phase::Analyzing,
                &Request::Classify {
                    summary,
                    seed: self.seed,
                },
            )
            .map_err(|e| JudgeError::Oracle(e.to_string()))?;
        Ok(parse_label_reply(&reply))
    }
}

/// `{"source": ..., "compiler_flags": [...]}`, or the raw text as source.
pub fn parse_code_reply(reply: &str) -> GeneratedCode {
    match serde_json::from_str::<GeneratedCode>(reply.trim()) {
        Ok(code) => code,
        Err(_) => GeneratedCode {
            source: strip_fence(reply),
            compiler_flags: Vec::new(),
        },
    }
}

/// `{"label": ...}`, or the raw text.
pub fn parse_label_reply(reply: &str) -> String {
    match serde_json::from_str::<LabelReply>(reply.trim()) {
        Ok(parsed) => parsed.label,
        Err(_) => reply.trim().to_string(),
    }
}

/// Drop a surrounding Markdown code fence if present.
fn strip_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(body) = trimmed.strip_prefix("```") {
        let body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        let body = body.trim_end().strip_suffix("```").unwrap_or(body);
        return body.trim_end().to_string() + "\n";
    }
    text.to_string()
}

/// Producers built from settings. The oracle is optional.
pub struct ProducerSet {
    pub planner: CommandProducer,
    pub coder: CommandProducer,
    pub oracle: Option<Arc<CommandProducer>>,
}

impl ProducerSet {
    pub fn from_settings(settings: &ProducerSettings, seed: Option<u64>) -> Result<Self> {
        if settings.planner_cmd.is_empty() {
            return Err(JudgeError::Config("producers.planner_cmd is not set".to_string()));
        }
        if settings.coder_cmd.is_empty() {
            return Err(JudgeError::Config("producers.coder_cmd is not set".to_string()));
        }
        let timeout = Duration::from_millis(settings.timeout_ms());
        let build = |argv: &[String]| {
            let producer = CommandProducer::new(argv.to_vec(), timeout);
            match seed {
                Some(seed) => producer.with_seed(seed),
                None => producer,
            }
        };
        Ok(Self {
            planner: build(&settings.planner_cmd),
            coder: build(&settings.coder_cmd),
            oracle: settings
                .oracle_cmd
                .as_deref()
                .filter(|argv| !argv.is_empty())
                .map(|argv| Arc::new(build(argv))),
        })
    }
}
