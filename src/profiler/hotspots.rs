//! Line-level hotspots from gprof.
//!
//! Debug-only: the candidate is rebuilt with profiling flags, run once, and
//! the flat profile is summarized. Nothing here is fatal to a profile.

use crate::config::types::Result;
use crate::exec::process::{self, ProcessSpec};
use crate::exec::Sandbox;
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_HOTSPOTS: usize = 5;

pub struct HotspotRequest<'a> {
    pub source: &'a str,
    pub flags: &'a [String],
    pub profiling_flags: &'a [String],
    pub gprof: &'a str,
    pub input: String,
}

/// Collect hotspots, logging and swallowing any failure.
pub fn collect(sandbox: &Sandbox, request: &HotspotRequest<'_>) -> BTreeMap<String, String> {
    match try_collect(sandbox, request) {
        Ok(hotspots) => hotspots,
        Err(e) => {
            log::warn!("Hotspot collection failed: {}", e);
            BTreeMap::new()
        }
    }
}

fn try_collect(sandbox: &Sandbox, request: &HotspotRequest<'_>) -> Result<BTreeMap<String, String>> {
    let mut flags = request.flags.to_vec();
    flags.extend_from_slice(request.profiling_flags);
    let binary = sandbox.compile(request.source, &flags)?;

    // gmon.out lands in the working directory of the profiled run.
    let workspace = sandbox.compiler().workspaces().create_workspace()?;
    let limits = sandbox.executor().limits();
    let argv = sandbox.compiler().adapter().run_command(&binary.path);
    let run = ProcessSpec::new(argv, limits.timeout)
        .with_stdin(request.input.clone().into_bytes())
        .with_workdir(workspace.run_dir());
    let outcome = process::run(&run)?;
    if !outcome.success() {
        log::warn!("Profiled run did not complete cleanly: exit={:?}", outcome.exit_code);
    }

    let gmon = workspace.scratch_path("gmon.out");
    if !gmon.is_file() {
        log::warn!("gprof data not produced at {}", gmon.display());
        return Ok(BTreeMap::new());
    }

    let report = ProcessSpec::new(
        vec![
            request.gprof.to_string(),
            "-b".to_string(),
            "-l".to_string(),
            binary.path.to_string_lossy().to_string(),
            gmon.to_string_lossy().to_string(),
        ],
        Duration::from_secs(30),
    )
    .with_workdir(workspace.run_dir());
    let outcome = process::run(&report)?;
    if !outcome.success() {
        log::warn!("gprof failed: {}", outcome.stderr_lossy().trim());
        return Ok(BTreeMap::new());
    }
    Ok(parse_flat_profile(&outcome.stdout_lossy(), MAX_HOTSPOTS))
}

/// Parse the flat profile section of `gprof -b` output into
/// `location -> "x% self, ys"`, keeping the first `limit` entries.
pub fn parse_flat_profile(report: &str, limit: usize) -> BTreeMap<String, String> {
    let mut hotspots = BTreeMap::new();
    let mut in_table = false;

    for line in report.lines() {
        let trimmed = line.trim();
        if !in_table {
            if trimmed.starts_with("time") && trimmed.contains("seconds") {
                in_table = true;
            }
            continue;
        }
        if trimmed.is_empty() {
            break;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.len() < 4 {
            continue;
        }
        let (Ok(percent), Ok(self_secs)) = (tokens[0].parse::<f64>(), tokens[2].parse::<f64>())
        else {
            continue;
        };
        let name_start = tokens[3..]
            .iter()
            .position(|t| t.parse::<f64>().is_err())
            .map(|p| p + 3)
            .unwrap_or(tokens.len());
        if name_start >= tokens.len() {
            continue;
        }
        let location = tokens[name_start..].join(" ");
        hotspots.insert(location, format!("{:.2}% self, {:.2}s", percent, self_secs));
        if hotspots.len() >= limit {
            break;
        }
    }
    hotspots
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "Flat profile:

Each sample counts as 0.01 seconds.
  %   cumulative   self              self     total
 time   seconds   seconds    calls  Ts/call  Ts/call  name
 60.00      0.06     0.06                             main (source.cpp:12 @ 1189)
 30.00      0.09     0.03    10000     0.00     0.00  solve(int) (source.cpp:5 @ 1140)
 10.00      0.10     0.01                             main (source.cpp:14 @ 11a0)

\t\t     Call graph
";

    #[test]
    fn test_parse_flat_profile() {
        let hotspots = parse_flat_profile(FLAT, 5);
        assert_eq!(hotspots.len(), 3);
        assert_eq!(
            hotspots.get("main (source.cpp:12 @ 1189)").map(String::as_str),
            Some("60.00% self, 0.06s")
        );
        assert!(hotspots.contains_key("solve(int) (source.cpp:5 @ 1140)"));
    }

    #[test]
    fn test_parse_flat_profile_limit() {
        assert_eq!(parse_flat_profile(FLAT, 1).len(), 1);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_flat_profile("no profile here", 5).is_empty());
    }
}
