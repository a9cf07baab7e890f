//! Empirical profiling across a size ladder.
//!
//! One compile, then one bounded run per ladder size. A timeout or crash at a
//! size records the sentinel for that slot and the remaining sizes still run.

pub mod generator;
pub mod hotspots;
pub mod ladder;

use crate::config::settings::Settings;
use crate::config::types::{
    Candidate, ExecError, ExecutionProfile, Fidelity, JudgeError, Plan, Result,
};
use crate::controller::producers::Profiling;
use crate::exec::Sandbox;
use generator::{generator_for, InputGenerator};
use hotspots::HotspotRequest;
use ladder::SizeLadder;

struct HotspotSettings {
    profiling_flags: Vec<String>,
    gprof: String,
}

pub struct Profiler {
    sandbox: Sandbox,
    generator: Box<dyn InputGenerator>,
    explicit_ladder: Option<SizeLadder>,
    max_size: u64,
    hotspots: Option<HotspotSettings>,
}

impl Profiler {
    /// The configured generator starts at seed 0; see [`Profiler::with_generator`].
    pub fn new(sandbox: Sandbox, settings: &Settings) -> Result<Self> {
        let generator = generator_for(&settings.sandbox.generator, 0).ok_or_else(|| {
            JudgeError::Config(format!(
                "unknown input generator: {}",
                settings.sandbox.generator
            ))
        })?;
        let explicit_ladder = if settings.sandbox.input_sizes.is_empty() {
            None
        } else {
            Some(SizeLadder::new(settings.sandbox.input_sizes.clone())?)
        };
        let hotspots = settings.sandbox.debug_hotspots.then(|| HotspotSettings {
            profiling_flags: settings.toolchain.profiling_flags.clone(),
            gprof: settings.toolchain.gprof.clone(),
        });
        Ok(Self {
            sandbox,
            generator,
            explicit_ladder,
            max_size: settings.sandbox.max_size,
            hotspots,
        })
    }

    pub fn with_generator(mut self, generator: Box<dyn InputGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_ladder(mut self, ladder: SizeLadder) -> Self {
        self.explicit_ladder = Some(ladder);
        self
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Ladder used for a declared bound; the explicit ladder wins when set.
    pub fn ladder_for(&self, bound: Option<u64>) -> SizeLadder {
        match &self.explicit_ladder {
            Some(ladder) => ladder.clone(),
            None => SizeLadder::for_bound(bound.unwrap_or(self.max_size), self.max_size),
        }
    }

    /// Compile `source` and measure it at every ladder size.
    pub fn profile_source(
        &self,
        source: &str,
        flags: &[String],
        bound: Option<u64>,
    ) -> Result<ExecutionProfile> {
        let ladder = self.ladder_for(bound);
        let binary = self.sandbox.compile(source, flags)?;
        let mut profile = ExecutionProfile::with_sizes(ladder.sizes().to_vec());

        for (index, &size) in ladder.sizes().iter().enumerate() {
            let input = self.generator.generate(size);
            match self.sandbox.execute(&binary, &input) {
                Ok(telemetry) => {
                    profile.record(index, telemetry.wallclock_ms, telemetry.peak_rss_mb);
                    if telemetry.fidelity == Fidelity::Fallback {
                        profile.fidelity = Fidelity::Fallback;
                    }
                }
                Err(ExecError::TelemetryParse { reason, estimate }) => {
                    log::warn!("n={}: telemetry unparseable ({}); recording estimate", size, reason);
                    profile.record(index, estimate.wallclock_ms, estimate.peak_rss_mb);
                    profile.fidelity = Fidelity::Fallback;
                }
                Err(e) => {
                    log::warn!("n={}: {}", size, e);
                }
            }
        }

        if let Some(settings) = &self.hotspots {
            if let Some(size) = ladder.first_nontrivial() {
                let request = HotspotRequest {
                    source,
                    flags,
                    profiling_flags: &settings.profiling_flags,
                    gprof: &settings.gprof,
                    input: self.generator.generate(size),
                };
                profile.hotspots = hotspots::collect(&self.sandbox, &request);
            }
        }

        log::info!(
            "Profiled {} sizes ({} failed), worst {:.2} ms",
            profile.len(),
            profile.failed_points(),
            profile.worst_runtime_ms()
        );
        Ok(profile)
    }
}

impl Profiling for Profiler {
    fn profile(&self, candidate: &Candidate, plan: &Plan) -> Result<ExecutionProfile> {
        self.profile_source(&candidate.source, &candidate.compiler_flags, plan.max_bound())
    }
}
