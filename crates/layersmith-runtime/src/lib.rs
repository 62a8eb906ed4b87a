//! Dependency installers and subprocess plumbing for layersmith builds.
//!
//! This crate implements the install layer: a `RuntimeInstaller` trait with
//! Python (venv + pip) and Node (npm prefix) implementations, dispatch from a
//! runtime family to its installer, a blocking subprocess runner with
//! timeouts, cancellation and process-group teardown, and prerequisite
//! checks for the host tools a build needs.

pub mod exec;
pub mod installer;
pub mod mock;
pub mod node;
pub mod prereq;
pub mod python;

pub use exec::{Cancellation, ExecOptions};
pub use installer::{select_installer, InstallContext, RuntimeInstaller, Toolchain};
pub use prereq::{check_family_prereqs, check_tool, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("'{program}' was not found (is it installed and on PATH?)")]
    ToolMissing { program: String },
    #[error("`{command}` failed with {}", exit_label(.code))]
    ToolFailed { command: String, code: Option<i32> },
    #[error("`{command}` failed with {}: {stderr}", exit_label(.code))]
    ToolRejected {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
    #[error("specified runtime {declared} does not match local toolchain {actual}")]
    RuntimeMismatch { declared: String, actual: String },
    #[error("could not determine {tool} version from '{output}'")]
    UnrecognizedVersion { tool: String, output: String },
    #[error("{installer} installer cannot build runtime '{runtime}'")]
    WrongFamily { installer: String, runtime: String },
    #[error("installer produced no output at {0}")]
    MissingOutput(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (killed by signal)".to_owned(),
    }
}
