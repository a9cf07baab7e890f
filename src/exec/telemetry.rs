//! External measurement instrument.
//!
//! GNU `time -v` writes its report to a stats file; BSD `time -l` appends its
//! report to the program's stderr. When neither validates, wall time comes from
//! the host monotonic clock and memory from the reaped child's own rusage.

use crate::exec::process::{self, ProcessSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GNU_RSS_FIELD: &str = "Maximum resident set size (kbytes)";
const GNU_WALL_FIELD: &str = "Elapsed (wall clock) time";
const BSD_RSS_FIELD: &str = "maximum resident set size";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementTool {
    GnuTime { path: PathBuf },
    BsdTime { path: PathBuf },
    HostClock,
}

/// Numbers parsed from an instrument report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentReading {
    pub wallclock_ms: f64,
    pub peak_rss_mb: f64,
}

impl MeasurementTool {
    /// Try candidate tools and keep the first that emits the expected field.
    pub fn detect(override_path: Option<&Path>) -> Self {
        let candidates: Vec<MeasurementTool> = match override_path {
            Some(path) => vec![
                Self::GnuTime {
                    path: path.to_path_buf(),
                },
                Self::BsdTime {
                    path: path.to_path_buf(),
                },
            ],
            None if cfg!(target_os = "macos") => vec![
                Self::BsdTime {
                    path: PathBuf::from("/usr/bin/time"),
                },
                Self::GnuTime {
                    path: PathBuf::from("gtime"),
                },
            ],
            None => vec![
                Self::GnuTime {
                    path: PathBuf::from("/usr/bin/time"),
                },
                Self::GnuTime {
                    path: PathBuf::from("gtime"),
                },
            ],
        };

        for tool in candidates {
            if tool.responds() {
                log::info!("Measurement tool: {}", tool.describe());
                return tool;
            }
            log::debug!("Measurement tool candidate rejected: {}", tool.describe());
        }
        log::warn!("No measurement tool validated; using host clock and rusage fallback");
        Self::HostClock
    }

    fn responds(&self) -> bool {
        let (argv, field) = match self {
            Self::GnuTime { path } => (
                vec![path_arg(path), "-v".to_string(), "true".to_string()],
                GNU_RSS_FIELD,
            ),
            Self::BsdTime { path } => (
                vec![path_arg(path), "-l".to_string(), "true".to_string()],
                BSD_RSS_FIELD,
            ),
            Self::HostClock => return true,
        };
        match process::run(&ProcessSpec::new(argv, Duration::from_secs(5))) {
            Ok(outcome) => outcome.success() && outcome.stderr_lossy().contains(field),
            Err(_) => false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::HostClock)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::GnuTime { path } => format!("GNU time -v ({})", path.display()),
            Self::BsdTime { path } => format!("BSD time -l ({})", path.display()),
            Self::HostClock => "host clock + rusage".to_string(),
        }
    }

    /// Wrap a run argv with the instrument. GNU time writes to `stats_file`.
    pub fn wrap(&self, argv: &[String], stats_file: &Path) -> Vec<String> {
        let mut wrapped = match self {
            Self::GnuTime { path } => vec![
                path_arg(path),
                "-v".to_string(),
                "-o".to_string(),
                path_arg(stats_file),
            ],
            Self::BsdTime { path } => vec![path_arg(path), "-l".to_string()],
            Self::HostClock => Vec::new(),
        };
        wrapped.extend_from_slice(argv);
        wrapped
    }

    /// Parse a report: stats file text for GNU, stderr for BSD.
    pub fn parse(&self, report: &str) -> Result<InstrumentReading, String> {
        match self {
            Self::GnuTime { .. } => parse_gnu(report),
            Self::BsdTime { .. } => parse_bsd(report),
            Self::HostClock => Err("host clock has no report".to_string()),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn parse_gnu(report: &str) -> Result<InstrumentReading, String> {
    let mut wall = None;
    let mut rss_kb = None;
    for line in report.lines() {
        let line = line.trim();
        let Some((label, value)) = line.rsplit_once(": ") else {
            continue;
        };
        if label.starts_with(GNU_WALL_FIELD) {
            wall = parse_clock(value.trim());
        } else if label == GNU_RSS_FIELD {
            rss_kb = value.trim().parse::<u64>().ok();
        }
    }
    let rss_kb = rss_kb.ok_or_else(|| format!("missing '{}'", GNU_RSS_FIELD))?;
    let wall_secs = wall.ok_or_else(|| format!("missing '{}'", GNU_WALL_FIELD))?;
    Ok(InstrumentReading {
        wallclock_ms: wall_secs * 1000.0,
        peak_rss_mb: rss_kb as f64 / 1024.0,
    })
}

/// `h:mm:ss` or `m:ss.ss` to seconds.
fn parse_clock(value: &str) -> Option<f64> {
    let mut seconds = 0.0;
    for part in value.split(':') {
        seconds = seconds * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(seconds)
}

/// Signal named by a GNU report ("Command terminated by signal 9").
pub fn gnu_terminating_signal(report: &str) -> Option<i32> {
    report.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Command terminated by signal ")
            .and_then(|rest| rest.trim().parse().ok())
    })
}

pub fn parse_bsd(report: &str) -> Result<InstrumentReading, String> {
    let mut wall = None;
    let mut rss_bytes = None;
    for line in report.lines() {
        let line = line.trim();
        if line.ends_with(BSD_RSS_FIELD) {
            rss_bytes = line
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok());
        } else if let Some(idx) = line.find(" real") {
            wall = line[..idx].trim().parse::<f64>().ok();
        }
    }
    let rss_bytes = rss_bytes.ok_or_else(|| format!("missing '{}'", BSD_RSS_FIELD))?;
    let wall_secs = wall.ok_or_else(|| "missing 'real'".to_string())?;
    Ok(InstrumentReading {
        wallclock_ms: wall_secs * 1000.0,
        peak_rss_mb: rss_bytes as f64 / (1024.0 * 1024.0),
    })
}

/// Drop the BSD report lines from a program's stderr.
pub fn strip_bsd_report(stderr: &str) -> String {
    match stderr.rfind(" real ") {
        Some(idx) => {
            let line_start = stderr[..idx].rfind('\n').map(|i| i + 1).unwrap_or(0);
            stderr[..line_start].to_string()
        }
        None => stderr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GNU_REPORT: &str = "\tCommand being timed: \"./solution\"
\tUser time (seconds): 0.12
\tSystem time (seconds): 0.01
\tPercent of CPU this job got: 98%
\tElapsed (wall clock) time (h:mm:ss or m:ss): 0:00.25
\tMaximum resident set size (kbytes): 20480
\tExit status: 0
";

    const BSD_REPORT: &str = "program noise
        1.50 real         1.20 user         0.10 sys
            10485760  maximum resident set size
                   0  average shared memory size
";

    #[test]
    fn test_parse_gnu_report() {
        let reading = parse_gnu(GNU_REPORT).unwrap();
        assert!((reading.wallclock_ms - 250.0).abs() < 1e-6);
        assert!((reading.peak_rss_mb - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_gnu_hours_clock() {
        assert_eq!(parse_clock("1:02:03"), Some(3723.0));
        assert_eq!(parse_clock("0:01.50"), Some(1.5));
        assert_eq!(parse_clock("x:01"), None);
    }

    #[test]
    fn test_parse_gnu_missing_rss() {
        let report = "\tElapsed (wall clock) time (h:mm:ss or m:ss): 0:00.01\n";
        let err = parse_gnu(report).unwrap_err();
        assert!(err.contains("Maximum resident set size"));
    }

    #[test]
    fn test_gnu_signal_line() {
        let report = "\tCommand terminated by signal 11\n\tExit status: 0\n";
        assert_eq!(gnu_terminating_signal(report), Some(11));
        assert_eq!(gnu_terminating_signal(GNU_REPORT), None);
    }

    #[test]
    fn test_parse_bsd_report() {
        let reading = parse_bsd(BSD_REPORT).unwrap();
        assert!((reading.wallclock_ms - 1500.0).abs() < 1e-6);
        assert!((reading.peak_rss_mb - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_bsd_rejects_missing_fields() {
        assert!(parse_bsd("1.0 real 0.5 user 0.1 sys\n").is_err());
        assert!(parse_bsd("").is_err());
    }

    #[test]
    fn test_strip_bsd_report() {
        assert_eq!(strip_bsd_report(BSD_REPORT), "program noise\n");
        assert_eq!(strip_bsd_report("plain"), "plain");
    }

    #[test]
    fn test_wrap_layouts() {
        let argv = vec!["./solution".to_string()];
        let gnu = MeasurementTool::GnuTime {
            path: PathBuf::from("/usr/bin/time"),
        };
        assert_eq!(
            gnu.wrap(&argv, Path::new("/tmp/stats")),
            vec!["/usr/bin/time", "-v", "-o", "/tmp/stats", "./solution"]
        );
        assert_eq!(MeasurementTool::HostClock.wrap(&argv, Path::new("/x")), argv);
        assert!(MeasurementTool::HostClock.is_fallback());
    }
}
