//! Blocking child-process execution with timeouts and cancellation.
//!
//! Every external tool a build runs (shell hooks, installers, `strip`) goes
//! through here. Children are placed in their own process group so a
//! timeout or cancellation can tear down everything they spawned.

use crate::RuntimeError;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 10;

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a child process is supervised and where its output goes.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Kill the child if it has not exited after this long.
    pub timeout: Option<Duration>,
    pub cancellation: Cancellation,
    /// Append stdout/stderr here instead of inheriting the parent's streams.
    pub log_path: Option<PathBuf>,
}

impl ExecOptions {
    #[must_use]
    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run to completion; any non-zero exit is an error.
pub fn run(cmd: &mut Command, opts: &ExecOptions) -> Result<(), RuntimeError> {
    let command = describe(cmd);
    let (stdout, stderr) = output_streams(&command, opts)?;
    cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
    let status = spawn_and_wait(cmd, &command, opts)?;
    check_status(&command, status)
}

/// Run to completion with stdout written to `out`.
pub fn run_to_file(cmd: &mut Command, out: &Path, opts: &ExecOptions) -> Result<(), RuntimeError> {
    let command = describe(cmd);
    let (_, stderr) = output_streams(&command, opts)?;
    let file = File::create(out)?;
    cmd.stdin(Stdio::null()).stdout(file).stderr(stderr);
    let status = spawn_and_wait(cmd, &command, opts)?;
    check_status(&command, status)
}

/// Run to completion and collect both streams. On a non-zero exit the
/// error carries the tail of stderr.
///
/// Only meant for short outputs such as `--version`: the pipes are drained
/// after exit, so a child that fills them would stall until the timeout.
pub fn capture(cmd: &mut Command, opts: &ExecOptions) -> Result<Output, RuntimeError> {
    let command = describe(cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(cmd, &command)?;
    let status = supervise(&mut child, &command, opts)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout)?;
    }
    if let Some(mut err) = child.stderr.take() {
        err.read_to_end(&mut stderr)?;
    }
    if !status.success() {
        let tail = stderr_tail(&stderr);
        if !tail.is_empty() {
            return Err(RuntimeError::ToolRejected {
                command,
                code: status.code(),
                stderr: tail,
            });
        }
    }
    check_status(&command, status)?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Last `lines` lines of a build log, for failure diagnostics.
pub fn log_tail(path: &Path, lines: usize) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|l| (*l).to_owned()).collect()
}

fn output_streams(command: &str, opts: &ExecOptions) -> Result<(Stdio, Stdio), RuntimeError> {
    match &opts.log_path {
        Some(path) => {
            let mut log = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(log, "$ {command}")?;
            let err = log.try_clone()?;
            Ok((Stdio::from(log), Stdio::from(err)))
        }
        None => Ok((Stdio::inherit(), Stdio::inherit())),
    }
}

fn spawn(cmd: &mut Command, command: &str) -> Result<Child, RuntimeError> {
    debug!("spawning: {command}");
    cmd.process_group(0);
    cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::ToolMissing {
                program: cmd.get_program().to_string_lossy().into_owned(),
            }
        } else {
            RuntimeError::Io(e)
        }
    })
}

fn spawn_and_wait(
    cmd: &mut Command,
    command: &str,
    opts: &ExecOptions,
) -> Result<ExitStatus, RuntimeError> {
    let mut child = spawn(cmd, command)?;
    supervise(&mut child, command, opts)
}

fn supervise(
    child: &mut Child,
    command: &str,
    opts: &ExecOptions,
) -> Result<ExitStatus, RuntimeError> {
    let deadline = opts.timeout.map(|t| Instant::now() + t);
    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            return Ok(status);
        }
        if opts.cancellation.is_cancelled() {
            warn!("cancelling `{command}`");
            kill_group(child);
            return Err(RuntimeError::Cancelled {
                command: command.to_owned(),
            });
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let secs = opts.timeout.map_or(0, |t| t.as_secs());
            warn!("`{command}` exceeded {secs}s, killing process group");
            kill_group(child);
            return Err(RuntimeError::TimedOut {
                command: command.to_owned(),
                secs,
            });
        }
    }
}

fn kill_group(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        // The child leads its own group (process_group(0)), so pgid == pid.
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!("killpg({pid}) failed: {e}");
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn check_status(command: &str, status: ExitStatus) -> Result<(), RuntimeError> {
    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::ToolFailed {
            command: command.to_owned(),
            code: status.code(),
        })
    }
}
