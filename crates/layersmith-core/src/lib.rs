//! Core orchestration engine for layersmith builds.
//!
//! This crate ties together the schema, runtime installers, and artifact
//! handling into the `Engine`, the central API for building layers from
//! `LayerSpec`s, publishing the results, and checking host prerequisites.
//! It also provides the per-build state machine, cancellation wiring for
//! Ctrl-C, per-family cache locks, and the `layersmith.toml` configuration.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod lifecycle;

pub use concurrency::{install_signal_handler, FamilyLock};
pub use config::{BuildConfig, ToolConfig, CONFIG_FILE_NAME};
pub use engine::{BatchReport, BuildEvent, BuildReport, Engine};
pub use lifecycle::{validate_transition, BuildState, BuildTracker};

use layersmith_artifact::ArtifactError;
use layersmith_runtime::RuntimeError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Schema(#[from] layersmith_schema::SchemaError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("{0}")]
    Artifact(#[from] ArtifactError),
    #[error("{0}")]
    Registry(#[from] layersmith_registry::RegistryError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("lock error: {0}")]
    Lock(String),
    #[error("build cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage a build was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Acquire,
    Install,
    Normalize,
    Package,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "validate"),
            Stage::Acquire => write!(f, "acquire"),
            Stage::Install => write!(f, "install"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::Package => write!(f, "package"),
        }
    }
}

/// Coarse classification of a build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad layer definition; nothing was touched.
    Config,
    /// Local toolchain does not provide the declared runtime.
    RuntimeMismatch,
    /// An external program failed, timed out, or was cancelled.
    ExternalTool,
    /// The workspace could not be allocated.
    Workspace,
    /// Normalization or packaging failed for a reason other than a tool.
    Artifact,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Config => write!(f, "config"),
            FailureKind::RuntimeMismatch => write!(f, "runtime-mismatch"),
            FailureKind::ExternalTool => write!(f, "external-tool"),
            FailureKind::Workspace => write!(f, "workspace"),
            FailureKind::Artifact => write!(f, "artifact"),
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CoreError::Schema(_) | CoreError::Config(_) => FailureKind::Config,
            CoreError::Runtime(e) => runtime_kind(e),
            CoreError::Artifact(ArtifactError::Runtime(e)) => runtime_kind(e),
            CoreError::Artifact(
                ArtifactError::WorkspaceAcquire { .. } | ArtifactError::WorkspaceRelease { .. },
            )
            | CoreError::Lock(_) => FailureKind::Workspace,
            CoreError::Artifact(_) | CoreError::InvalidTransition { .. } | CoreError::Io(_) => {
                FailureKind::Artifact
            }
            CoreError::Registry(_) | CoreError::Cancelled => FailureKind::ExternalTool,
        }
    }
}

fn runtime_kind(e: &RuntimeError) -> FailureKind {
    match e {
        RuntimeError::RuntimeMismatch { .. }
        | RuntimeError::WrongFamily { .. }
        | RuntimeError::UnrecognizedVersion { .. } => FailureKind::RuntimeMismatch,
        _ => FailureKind::ExternalTool,
    }
}

/// A failed layer build: which layer, where, and why.
#[derive(Debug, Error)]
#[error("layer '{layer}' failed at {stage}: {source}")]
pub struct BuildError {
    pub layer: String,
    pub stage: Stage,
    #[source]
    pub source: CoreError,
}

impl BuildError {
    pub fn new(layer: &str, stage: Stage, source: impl Into<CoreError>) -> Self {
        Self {
            layer: layer.to_owned(),
            stage,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}
