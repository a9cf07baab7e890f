/// Static plan pruning
/// Rejects plans whose described approach cannot meet the declared bound
/// before any code is generated.
use crate::config::types::Plan;
use crate::controller::producers::Pruner;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PruneDecision {
    Accept,
    Reject { rule: String, reason: String },
}

impl PruneDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Structural facts read from a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanFeatures {
    pub while_loops: usize,
    pub loop_depth: usize,
    pub recursion: bool,
    pub memoized: bool,
    pub sort_in_loop: bool,
    pub max_bound: u64,
}

const LOOP_WORDS: [&str; 5] = ["loop", "for each", "for every", "iterate", "each iteration"];

impl PlanFeatures {
    /// Extract features from the algorithm text and declared bounds.
    ///
    /// A `loop_depth` entry in the plan constraints overrides the text estimate.
    pub fn from_plan(plan: &Plan) -> Self {
        let text = plan.algorithm.to_lowercase();

        let while_loops = text.matches("while").count();
        let recursion = text.contains("recurs");
        let memoized = ["memo", "dynamic programming", " dp", "cache", "tabulat"]
            .iter()
            .any(|w| text.contains(w));
        let sort_in_loop = text
            .split(|c| c == '.' || c == ';' || c == '\n')
            .any(|clause| {
                clause.contains("sort")
                    && (LOOP_WORDS.iter().any(|w| clause.contains(w)) || clause.contains("inside"))
            });

        let loop_depth = match plan.constraints.get("loop_depth") {
            Some(depth) if *depth >= 0 => *depth as usize,
            _ => estimate_depth(&text),
        };

        Self {
            while_loops,
            loop_depth,
            recursion,
            memoized,
            sort_in_loop,
            max_bound: plan.max_bound().unwrap_or(0),
        }
    }
}

fn estimate_depth(text: &str) -> usize {
    let mentions_loop = LOOP_WORDS.iter().any(|w| text.contains(w));
    if (text.contains("triple") || text.contains("three nested")) && mentions_loop {
        3
    } else if (text.contains("nested") || text.contains("double loop")) && mentions_loop {
        2
    } else if mentions_loop {
        1
    } else {
        0
    }
}

/// One rejection rule with an explicit numeric threshold.
pub trait PruneRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reason for rejection, or `None` when the plan passes.
    fn check(&self, features: &PlanFeatures) -> Option<String>;
}

pub struct ExcessiveWhileLoops {
    pub max_loops: usize,
    pub min_bound: u64,
}

impl PruneRule for ExcessiveWhileLoops {
    fn name(&self) -> &'static str {
        "excessive_while_loops"
    }

    fn check(&self, f: &PlanFeatures) -> Option<String> {
        (f.while_loops > self.max_loops && f.max_bound >= self.min_bound).then(|| {
            format!(
                "{} while-loops with input bound {} (limit {} at >= {})",
                f.while_loops, f.max_bound, self.max_loops, self.min_bound
            )
        })
    }
}

pub struct UnmemoizedRecursion {
    pub min_bound: u64,
}

impl PruneRule for UnmemoizedRecursion {
    fn name(&self) -> &'static str {
        "unmemoized_recursion"
    }

    fn check(&self, f: &PlanFeatures) -> Option<String> {
        (f.recursion && !f.memoized && f.max_bound >= self.min_bound).then(|| {
            format!(
                "recursion without memoization at input bound {} (>= {})",
                f.max_bound, self.min_bound
            )
        })
    }
}

pub struct SortInsideLoop {
    pub min_bound: u64,
}

impl PruneRule for SortInsideLoop {
    fn name(&self) -> &'static str {
        "sort_inside_loop"
    }

    fn check(&self, f: &PlanFeatures) -> Option<String> {
        (f.sort_in_loop && f.max_bound >= self.min_bound).then(|| {
            format!(
                "sorting inside a loop at input bound {} (>= {})",
                f.max_bound, self.min_bound
            )
        })
    }
}

pub struct DeepLoopNesting {
    pub max_depth: usize,
    pub min_bound: u64,
}

impl PruneRule for DeepLoopNesting {
    fn name(&self) -> &'static str {
        "deep_loop_nesting"
    }

    fn check(&self, f: &PlanFeatures) -> Option<String> {
        (f.loop_depth >= self.max_depth && f.max_bound >= self.min_bound).then(|| {
            format!(
                "loop nesting depth {} at input bound {} (>= {})",
                f.loop_depth, f.max_bound, self.min_bound
            )
        })
    }
}

pub struct StaticPruner {
    rules: Vec<Box<dyn PruneRule>>,
}

impl StaticPruner {
    pub fn new(rules: Vec<Box<dyn PruneRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name())
    }
}

impl Default for StaticPruner {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ExcessiveWhileLoops {
                max_loops: 2,
                min_bound: 100_000,
            }),
            Box::new(UnmemoizedRecursion { min_bound: 10_000 }),
            Box::new(SortInsideLoop { min_bound: 1_000 }),
            Box::new(DeepLoopNesting {
                max_depth: 3,
                min_bound: 5_000,
            }),
        ])
    }
}

impl Pruner for StaticPruner {
    fn validate(&self, plan: &Plan) -> PruneDecision {
        let features = PlanFeatures::from_plan(plan);
        log::debug!("Plan features: {:?}", features);
        for rule in &self.rules {
            if let Some(reason) = rule.check(&features) {
                log::info!("Plan rejected by {}: {}", rule.name(), reason);
                return PruneDecision::Reject {
                    rule: rule.name().to_string(),
                    reason,
                };
            }
        }
        PruneDecision::Accept
    }
}
