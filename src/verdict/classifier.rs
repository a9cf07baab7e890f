/// Empirical complexity classification
/// Turns an execution profile into a routed verdict. Deterministic unless the
/// series is ambiguous and an oracle is configured.
use crate::config::settings::ClassifierSettings;
use crate::config::types::*;
use crate::controller::producers::Analyzer;
use crate::verdict::ambiguity::{self, label_for_slope};
use crate::verdict::fit::{fit_log_log, valid_points, ValidPoint};
use crate::verdict::oracle::{normalize_label, ComplexityOracle, SeriesSummary};
use std::sync::Arc;

pub struct ComplexityClassifier {
    settings: ClassifierSettings,
    oracle: Option<Arc<dyn ComplexityOracle>>,
}

impl ComplexityClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            settings,
            oracle: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ComplexityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn classify(&self, profile: &ExecutionProfile) -> Result<Verdict> {
        let points = valid_points(profile);
        if points.len() < self.settings.min_points {
            log::info!(
                "Only {} valid points; defaulting to O(1) with low confidence",
                points.len()
            );
            return Ok(Verdict::efficient(ComplexityLabel::Constant, Confidence::Low));
        }
        let Some(fit) = fit_log_log(&points) else {
            return Ok(Verdict::efficient(ComplexityLabel::Constant, Confidence::Low));
        };

        let reasons = ambiguity::detect(&points, &fit, &self.settings);
        let (label, confidence, escalated) = if reasons.is_empty() {
            (label_for_slope(fit.slope), Confidence::High, false)
        } else {
            let described: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
            log::info!("Ambiguous series: {}", described.join("; "));
            match &self.oracle {
                Some(oracle) => {
                    let summary = SeriesSummary::new(&points, &fit, &reasons);
                    let answer = oracle
                        .classify_ambiguous(&summary)
                        .map_err(|e| match e {
                            JudgeError::Oracle(_) => e,
                            other => JudgeError::Oracle(other.to_string()),
                        })?;
                    let label = normalize_label(&answer);
                    log::info!("Oracle answered {:?} -> {}", answer.trim(), label);
                    let confidence = if label == ComplexityLabel::Unknown {
                        Confidence::Low
                    } else {
                        Confidence::High
                    };
                    (label, confidence, true)
                }
                None => (label_for_slope(fit.slope), Confidence::Low, false),
            }
        };

        let verdict = if label.is_efficient() {
            Verdict::efficient(label, confidence)
        } else if label == ComplexityLabel::Unknown {
            Verdict::inefficient(label, confidence, TargetProducer::Planner, None)
        } else {
            let growth = memory_growth(&points);
            Verdict::inefficient(
                label,
                confidence,
                TargetProducer::Coder,
                patch_for(label, growth, self.settings.memory_growth_ratio),
            )
        };

        Ok(verdict
            .with_fit(fit.slope, fit.r_squared)
            .with_escalation(escalated))
    }
}

impl Analyzer for ComplexityClassifier {
    fn analyze(&self, profile: &ExecutionProfile) -> Result<Verdict> {
        self.classify(profile)
    }
}

/// Memory at the largest valid size over memory at the smallest.
pub fn memory_growth(points: &[ValidPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last))
            if first.memory_mb.is_finite()
                && last.memory_mb.is_finite()
                && first.memory_mb > 0.0 =>
        {
            last.memory_mb / first.memory_mb
        }
        _ => 1.0,
    }
}

/// Rewrite directive for an inefficient label.
pub fn patch_for(label: ComplexityLabel, memory_growth: f64, growth_threshold: f64) -> Option<String> {
    let patch = match label {
        ComplexityLabel::Quadratic if memory_growth >= growth_threshold => format!(
            "Quadratic runtime with {:.1}x memory growth: replace the pairwise scan with a \
             hash map (std::unordered_map) keyed by the looked-up value so each element is \
             resolved in expected O(1).",
            memory_growth
        ),
        ComplexityLabel::Quadratic => "Quadratic runtime: remove the inner loop. Sort once and \
             use two pointers or binary search, or precompute prefix sums, to reach \
             O(n log n) or better."
            .to_string(),
        ComplexityLabel::Cubic => "Cubic runtime: collapse one loop level by precomputing the \
             innermost aggregate (prefix sums or a lookup table)."
            .to_string(),
        ComplexityLabel::HighOrder | ComplexityLabel::Exponential => "Super-polynomial growth: \
             eliminate repeated subproblems with dynamic programming or memoization of the \
             recursive state."
            .to_string(),
        _ => return None,
    };
    Some(patch)
}
