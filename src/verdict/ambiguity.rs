use crate::config::settings::ClassifierSettings;
use crate::config::types::ComplexityLabel;
use crate::verdict::fit::{LogLogFit, ValidPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slope bands where neighbouring classes cannot be told apart: (center, half-width).
pub const BOUNDARY_BANDS: [(f64, f64); 3] = [(0.5, 0.1), (1.5, 0.2), (2.5, 0.2)];

/// Why a deterministic slope mapping cannot be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AmbiguityReason {
    LowFit { r_squared: f64 },
    BoundarySlope { slope: f64, boundary: f64 },
    NonMonotonic,
    SlopeOutOfRange { slope: f64 },
    NarrowRange { ratio: f64 },
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowFit { r_squared } => write!(f, "poor fit (R^2 = {:.3})", r_squared),
            Self::BoundarySlope { slope, boundary } => {
                write!(f, "slope {:.3} near class boundary {}", slope, boundary)
            }
            Self::NonMonotonic => f.write_str("runtime rises and falls across sizes"),
            Self::SlopeOutOfRange { slope } => write!(f, "implausible slope {:.3}", slope),
            Self::NarrowRange { ratio } => write!(f, "size range only {:.1}x", ratio),
        }
    }
}

/// Every ambiguity trigger that fires for this series.
pub fn detect(
    points: &[ValidPoint],
    fit: &LogLogFit,
    settings: &ClassifierSettings,
) -> Vec<AmbiguityReason> {
    let mut reasons = Vec::new();

    if fit.r_squared < settings.min_r_squared {
        reasons.push(AmbiguityReason::LowFit {
            r_squared: fit.r_squared,
        });
    }

    if let Some((boundary, _)) = BOUNDARY_BANDS
        .iter()
        .find(|(center, width)| (fit.slope - center).abs() <= *width)
    {
        reasons.push(AmbiguityReason::BoundarySlope {
            slope: fit.slope,
            boundary: *boundary,
        });
    }

    if is_non_monotonic(points, settings.monotonic_tolerance) {
        reasons.push(AmbiguityReason::NonMonotonic);
    }

    if fit.slope < settings.slope_floor || fit.slope > settings.slope_ceiling {
        reasons.push(AmbiguityReason::SlopeOutOfRange { slope: fit.slope });
    }

    let ratio = size_ratio(points);
    if ratio < settings.min_size_ratio {
        reasons.push(AmbiguityReason::NarrowRange { ratio });
    }

    reasons
}

/// Some relative step rises beyond `tolerance` and some falls beyond it.
fn is_non_monotonic(points: &[ValidPoint], tolerance: f64) -> bool {
    let mut rises = false;
    let mut falls = false;
    for pair in points.windows(2) {
        let step = (pair[1].runtime_ms - pair[0].runtime_ms) / pair[0].runtime_ms;
        rises |= step > tolerance;
        falls |= step < -tolerance;
    }
    rises && falls
}

fn size_ratio(points: &[ValidPoint]) -> f64 {
    let min = points.iter().map(|p| p.size).min().unwrap_or(1).max(1);
    let max = points.iter().map(|p| p.size).max().unwrap_or(1);
    max as f64 / min as f64
}

/// Deterministic slope mapping for unambiguous series.
pub fn label_for_slope(slope: f64) -> ComplexityLabel {
    if slope < 0.5 {
        ComplexityLabel::Constant
    } else if slope < 1.5 {
        ComplexityLabel::Linear
    } else if slope < 2.5 {
        ComplexityLabel::Quadratic
    } else {
        ComplexityLabel::HighOrder
    }
}
