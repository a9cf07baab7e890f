/// Bounded child-process execution.
///
/// The child runs in its own process group with an address-space cap and an
/// optional stack limit. Output is collected on reader threads, and the wall
/// clock is enforced from a waiter thread so the whole group can be killed.
use crate::config::types::ExecError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Minimum wait for output readers once the child has been reaped.
const READER_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub workdir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub memory_limit_bytes: Option<u64>,
    pub stack_limit_bytes: Option<u64>,
    /// Per-stream cap; the rest of the stream is drained and discarded.
    pub output_limit: usize,
}

impl ProcessSpec {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            stdin: None,
            workdir: None,
            env: Vec::new(),
            timeout,
            memory_limit_bytes: None,
            stack_limit_bytes: None,
            output_limit: 1024 * 1024,
        }
    }

    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub wall: Duration,
    /// High-water resident set size of this child, where the platform reports it.
    pub peak_rss_mb: Option<f64>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0) && self.signal.is_none()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Spawn `spec.argv` and wait for it under the wall-clock limit.
///
/// A timeout is reported through `timed_out`, not as an error; only a failed
/// spawn is an error here.
pub fn run(spec: &ProcessSpec) -> Result<ProcessOutcome, ExecError> {
    let program = spec.program().to_string();
    if program.is_empty() {
        return Err(ExecError::Spawn {
            program,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    }

    let mut cmd = Command::new(&program);
    cmd.args(&spec.argv[1..])
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.workdir {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
        let memory = spec.memory_limit_bytes;
        let stack = spec.stack_limit_bytes;
        unsafe {
            cmd.pre_exec(move || apply_limits(memory, stack));
        }
    }

    let start = Instant::now();
    let deadline = start + spec.timeout;
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();

    if let (Some(mut pipe), Some(data)) = (child.stdin.take(), spec.stdin.clone()) {
        // Detached: a writer blocked on a full pipe must not hold up the caller.
        thread::spawn(move || {
            // The program may exit without reading its input.
            let _ = pipe.write_all(&data);
        });
    }

    let limit = spec.output_limit;
    let stdout_rx = spawn_reader(child.stdout.take(), limit);
    let stderr_rx = spawn_reader(child.stderr.take(), limit);

    let (tx, rx) = crossbeam_channel::bounded::<std::io::Result<Reaped>>(1);
    let waiter = thread::spawn(move || {
        let _ = tx.send(reap(child));
    });

    let (reaped, mut timed_out) = match rx.recv_timeout(spec.timeout) {
        Ok(result) => {
            let reaped = result.map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;
            (Some(reaped), false)
        }
        Err(RecvTimeoutError::Timeout) => {
            log::debug!("{} (pid {}) exceeded {:?}, killing group", program, pid, spec.timeout);
            kill_group(pid);
            (rx.recv().ok().and_then(|r| r.ok()), true)
        }
        Err(RecvTimeoutError::Disconnected) => (None, false),
    };
    let _ = waiter.join();

    // Background members of the group would otherwise keep the pipes open.
    kill_group(pid);

    let mut collect = |rx: Receiver<Vec<u8>>, stream: &str| {
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .max(READER_GRACE);
        match rx.recv_timeout(wait) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("{} (pid {}) left its {} open past the deadline", program, pid, stream);
                timed_out = true;
                Vec::new()
            }
            Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    };
    let stdout = collect(stdout_rx, "stdout");
    let stderr = collect(stderr_rx, "stderr");

    let finished = reaped.as_ref().map(|r| r.finished).unwrap_or_else(Instant::now);
    let (exit_code, signal, peak_rss_mb) = match &reaped {
        Some(r) => (r.status.code(), exit_signal(&r.status), r.peak_rss_mb),
        None => (None, None, None),
    };

    Ok(ProcessOutcome {
        exit_code,
        signal,
        stdout,
        stderr,
        wall: finished.saturating_duration_since(start),
        peak_rss_mb,
        timed_out,
    })
}

/// Exit state of the direct child, reaped together with its resource usage.
struct Reaped {
    status: ExitStatus,
    finished: Instant,
    peak_rss_mb: Option<f64>,
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>, limit: usize) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    if let Some(stream) = stream {
        thread::spawn(move || {
            let _ = tx.send(collect_bounded(stream, limit));
        });
    }
    rx
}

/// Wait for this child only, so the usage figures cover it and its reaped
/// descendants and nothing else the judge has spawned.
#[cfg(unix)]
fn reap(child: Child) -> std::io::Result<Reaped> {
    use std::os::unix::process::ExitStatusExt;

    let pid = child.id() as libc::pid_t;
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: pid is our own unreaped child and both out-pointers are live.
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc == pid {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    let finished = Instant::now();
    drop(child);

    let max_rss = usage.ru_maxrss as f64;
    let peak_rss_mb = if cfg!(target_os = "macos") {
        max_rss / (1024.0 * 1024.0)
    } else {
        max_rss / 1024.0
    };
    Ok(Reaped {
        status: ExitStatus::from_raw(status),
        finished,
        peak_rss_mb: Some(peak_rss_mb),
    })
}

#[cfg(not(unix))]
fn reap(mut child: Child) -> std::io::Result<Reaped> {
    let status = child.wait()?;
    Ok(Reaped {
        status,
        finished: Instant::now(),
        peak_rss_mb: None,
    })
}

#[cfg(unix)]
fn apply_limits(memory: Option<u64>, stack: Option<u64>) -> std::io::Result<()> {
    use nix::sys::resource::{setrlimit, Resource};

    if let Some(bytes) = memory {
        setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("setrlimit(RLIMIT_AS) failed: {}", e),
            )
        })?;
    }
    if let Some(bytes) = stack {
        // Hard limit may sit below the request; run with the inherited stack.
        let _ = setrlimit(Resource::RLIMIT_STACK, bytes, bytes);
    }
    Ok(())
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn collect_bounded<R: Read>(mut stream: R, limit: usize) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(buffer.len());
                buffer.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    buffer
}
