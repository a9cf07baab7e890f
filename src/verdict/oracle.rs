//! Complexity oracle boundary.
//!
//! Ambiguous series are summarized and handed to an external oracle. Its
//! free-text answer is normalized into the closed label set here and nowhere
//! else.

use crate::config::types::{ComplexityLabel, Result};
use crate::verdict::ambiguity::AmbiguityReason;
use crate::verdict::fit::{LogLogFit, ValidPoint};
use serde::{Deserialize, Serialize};

/// Normalized view of an ambiguous series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// `(size, runtime_ms, memory_mb)`; runtime and memory are scaled to the first point.
    pub points: Vec<(u64, f64, f64)>,
    pub slope: f64,
    pub r_squared: f64,
    pub reasons: Vec<String>,
    pub allowed_labels: Vec<String>,
}

impl SeriesSummary {
    pub fn new(points: &[ValidPoint], fit: &LogLogFit, reasons: &[AmbiguityReason]) -> Self {
        let base_runtime = points.first().map(|p| p.runtime_ms).unwrap_or(1.0);
        let base_memory = points
            .first()
            .map(|p| p.memory_mb)
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(1.0);
        Self {
            points: points
                .iter()
                .map(|p| {
                    let memory = if p.memory_mb.is_finite() {
                        p.memory_mb / base_memory
                    } else {
                        0.0
                    };
                    (p.size, p.runtime_ms / base_runtime, memory)
                })
                .collect(),
            slope: fit.slope,
            r_squared: fit.r_squared,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            allowed_labels: ComplexityLabel::ALLOWED
                .iter()
                .map(|l| l.notation().to_string())
                .collect(),
        }
    }
}

pub trait ComplexityOracle: Send + Sync {
    /// Free-text answer naming one of `summary.allowed_labels`.
    fn classify_ambiguous(&self, summary: &SeriesSummary) -> Result<String>;
}

fn canonical(text: &str) -> String {
    text.to_lowercase()
        .replace('²', "^2")
        .replace('³', "^3")
        .replace("**", "^")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Map an oracle answer onto the closed label set.
///
/// Exact match first, then the longest notation contained in the answer,
/// then keyword patterns. Anything else is `O(?)`.
pub fn normalize_label(answer: &str) -> ComplexityLabel {
    let answer = canonical(answer.trim().trim_matches(|c| c == '"' || c == '`' || c == '.'));
    if answer.is_empty() {
        return ComplexityLabel::Unknown;
    }

    if let Some(label) = ComplexityLabel::ALLOWED
        .iter()
        .find(|l| canonical(l.notation()) == answer)
    {
        return *label;
    }

    let mut by_length: Vec<ComplexityLabel> = ComplexityLabel::ALLOWED.to_vec();
    by_length.sort_by_key(|l| std::cmp::Reverse(canonical(l.notation()).len()));
    if let Some(label) = by_length
        .iter()
        .find(|l| answer.contains(&canonical(l.notation())))
    {
        return *label;
    }

    const PATTERNS: [(&[&str], ComplexityLabel); 8] = [
        (&["2^n", "exponential"], ComplexityLabel::Exponential),
        (&["n^k", "polynomial"], ComplexityLabel::HighOrder),
        (&["n^3", "cubic"], ComplexityLabel::Cubic),
        (&["n^2", "quadratic"], ComplexityLabel::Quadratic),
        (&["nlogn", "linearithmic"], ComplexityLabel::Linearithmic),
        (&["logn", "logarithmic"], ComplexityLabel::Logarithmic),
        (&["linear"], ComplexityLabel::Linear),
        (&["constant"], ComplexityLabel::Constant),
    ];
    for (needles, label) in PATTERNS {
        if needles.iter().any(|n| answer.contains(n)) {
            return label;
        }
    }

    ComplexityLabel::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_notations() {
        for label in ComplexityLabel::ALLOWED {
            assert_eq!(normalize_label(label.notation()), label);
        }
        assert_eq!(normalize_label(" \"O(n log n)\" "), ComplexityLabel::Linearithmic);
        assert_eq!(normalize_label("o(N^2)."), ComplexityLabel::Quadratic);
    }

    #[test]
    fn test_substring_prefers_longest() {
        assert_eq!(
            normalize_label("The runtime looks like O(n log n) to me"),
            ComplexityLabel::Linearithmic
        );
        assert_eq!(
            normalize_label("I'd say O(n^2), definitely not O(n)"),
            ComplexityLabel::Quadratic
        );
    }

    #[test]
    fn test_pattern_fallback() {
        assert_eq!(normalize_label("quadratic growth"), ComplexityLabel::Quadratic);
        assert_eq!(normalize_label("n² behaviour"), ComplexityLabel::Quadratic);
        assert_eq!(normalize_label("exponential blowup"), ComplexityLabel::Exponential);
        assert_eq!(normalize_label("n log n"), ComplexityLabel::Linearithmic);
        assert_eq!(normalize_label("linear time"), ComplexityLabel::Linear);
        assert_eq!(normalize_label("roughly constant"), ComplexityLabel::Constant);
    }

    #[test]
    fn test_unparseable_is_unknown() {
        assert_eq!(normalize_label("no idea"), ComplexityLabel::Unknown);
        assert_eq!(normalize_label(""), ComplexityLabel::Unknown);
        assert_eq!(normalize_label("O(?)"), ComplexityLabel::Unknown);
    }

    #[test]
    fn test_summary_is_normalized() {
        let points = vec![
            ValidPoint {
                size: 10,
                runtime_ms: 2.0,
                memory_mb: 4.0,
            },
            ValidPoint {
                size: 100,
                runtime_ms: 8.0,
                memory_mb: 8.0,
            },
        ];
        let fit = LogLogFit {
            slope: 0.6,
            intercept: 0.0,
            r_squared: 0.5,
        };
        let summary = SeriesSummary::new(&points, &fit, &[AmbiguityReason::NonMonotonic]);
        assert_eq!(summary.points, vec![(10, 1.0, 1.0), (100, 4.0, 2.0)]);
        assert_eq!(summary.allowed_labels.len(), 8);
        assert_eq!(summary.reasons.len(), 1);
    }
}
