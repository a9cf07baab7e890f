use crate::config::types::ExecutionProfile;

/// A measurement usable for fitting: positive size, positive finite runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidPoint {
    pub size: u64,
    pub runtime_ms: f64,
    pub memory_mb: f64,
}

pub fn valid_points(profile: &ExecutionProfile) -> Vec<ValidPoint> {
    profile
        .input_sizes()
        .iter()
        .zip(profile.runtime_ms())
        .zip(profile.peak_memory_mb())
        .filter(|((size, runtime), _)| **size > 0 && runtime.is_finite() && **runtime > 0.0)
        .map(|((size, runtime), memory)| ValidPoint {
            size: *size,
            runtime_ms: *runtime,
            memory_mb: *memory,
        })
        .collect()
}

/// Ordinary least squares on `(log10 size, log10 runtime)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLogFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Fit the points; `None` when fewer than two points or all sizes coincide.
pub fn fit_log_log(points: &[ValidPoint]) -> Option<LogLogFit> {
    if points.len() < 2 {
        return None;
    }
    let xs: Vec<f64> = points.iter().map(|p| (p.size as f64).log10()).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.runtime_ms.log10()).collect();
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_xy = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        ss_xx += (x - mean_x) * (x - mean_x);
        ss_xy += (x - mean_x) * (y - mean_y);
    }
    if ss_xx == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        let predicted = intercept + slope * x;
        ss_res += (y - predicted) * (y - predicted);
        ss_tot += (y - mean_y) * (y - mean_y);
    }
    // Identical runtimes are a perfect horizontal fit.
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    Some(LogLogFit {
        slope,
        intercept,
        r_squared,
    })
}
