// Startup validation for settings.
// Errors are fatal; warnings are logged and the run continues.

use crate::config::settings::Settings;
use crate::profiler::generator::generator_for;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_settings(settings: &Settings) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_loop(settings, &mut result);
    validate_sandbox(settings, &mut result);
    validate_classifier(settings, &mut result);
    validate_toolchain(settings, &mut result);

    result
}

fn validate_loop(settings: &Settings, result: &mut ValidationResult) {
    if settings.max_iterations == 0 {
        result.add_error("max_iterations cannot be zero".to_string());
    }
    if !(0.0..1.0).contains(&settings.diminish_delta) {
        result.add_error(format!(
            "diminish_delta must be in [0, 1): {}",
            settings.diminish_delta
        ));
    }
    if settings.stall_patience == 0 {
        result.add_error("stall_patience cannot be zero".to_string());
    }
    if settings.max_agent_failures == 0 {
        result.add_error("max_agent_failures cannot be zero".to_string());
    }
    if settings.max_iterations > 10 {
        result.add_warning(format!(
            "max_iterations {} is high; each iteration profiles the whole ladder",
            settings.max_iterations
        ));
    }
}

fn validate_sandbox(settings: &Settings, result: &mut ValidationResult) {
    let sandbox = &settings.sandbox;
    if sandbox.timeout_ms == 0 {
        result.add_error("sandbox.timeout_ms cannot be zero".to_string());
    }
    if sandbox.memory_mb == 0 {
        result.add_error("sandbox.memory_mb cannot be zero".to_string());
    } else if sandbox.memory_mb < 16 {
        result.add_warning(format!(
            "sandbox.memory_mb {} is very low, most programs will fail to start",
            sandbox.memory_mb
        ));
    }
    if sandbox.compile_timeout_ms == 0 {
        result.add_error("sandbox.compile_timeout_ms cannot be zero".to_string());
    }
    if sandbox.max_size < 2 {
        result.add_error(format!("sandbox.max_size must be >= 2: {}", sandbox.max_size));
    }
    if !sandbox.input_sizes.is_empty()
        && sandbox.input_sizes.windows(2).any(|w| w[0] >= w[1])
    {
        result.add_error("sandbox.input_sizes must be strictly increasing".to_string());
    }
    if sandbox.scratch_root == sandbox.binary_store {
        result.add_error("sandbox.scratch_root and sandbox.binary_store must differ".to_string());
    }
    if generator_for(&sandbox.generator, 0).is_none() {
        result.add_error(format!("sandbox.generator is unknown: {}", sandbox.generator));
    }
}

fn validate_classifier(settings: &Settings, result: &mut ValidationResult) {
    let c = &settings.classifier;
    if c.min_points < 2 {
        result.add_error(format!("classifier.min_points must be >= 2: {}", c.min_points));
    }
    if !(0.0..=1.0).contains(&c.min_r_squared) {
        result.add_error(format!(
            "classifier.min_r_squared must be in [0, 1]: {}",
            c.min_r_squared
        ));
    }
    if c.slope_floor >= c.slope_ceiling {
        result.add_error(format!(
            "classifier.slope_floor ({}) must be < slope_ceiling ({})",
            c.slope_floor, c.slope_ceiling
        ));
    }
}

fn validate_toolchain(settings: &Settings, result: &mut ValidationResult) {
    if settings.toolchain.compiler.trim().is_empty() {
        result.add_error("toolchain.compiler cannot be empty".to_string());
    }
    if crate::judge::registry::adapter_for(&settings.toolchain).is_err() {
        result.add_error(format!(
            "toolchain.language is not supported: {}",
            settings.toolchain.language
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let result = validate_settings(&Settings::default());
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut settings = Settings::default();
        settings.max_iterations = 0;
        settings.sandbox.timeout_ms = 0;
        let result = validate_settings(&settings);
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_unsorted_ladder_rejected() {
        let mut settings = Settings::default();
        settings.sandbox.input_sizes = vec![10, 5, 100];
        let result = validate_settings(&settings);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("strictly increasing")));
    }

    #[test]
    fn test_unknown_generator_rejected() {
        let mut settings = Settings::default();
        settings.sandbox.generator = "graph".to_string();
        let result = validate_settings(&settings);
        assert!(result.errors.iter().any(|e| e.contains("sandbox.generator")));

        settings.sandbox.generator = "array-of-size".to_string();
        assert!(validate_settings(&settings).is_valid());
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut settings = Settings::default();
        settings.toolchain.language = "cobol".to_string();
        assert!(!validate_settings(&settings).is_valid());
    }

    #[test]
    fn test_low_memory_warns() {
        let mut settings = Settings::default();
        settings.sandbox.memory_mb = 8;
        let result = validate_settings(&settings);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }
}
