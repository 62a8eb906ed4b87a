//! Publishing built layer archives to the serverless layer registry.
//!
//! This crate provides the outer publish step: `PublisherConfig` for the
//! registry CLI and its region/profile selection, `PublishRequest` derived
//! from a `LayerSpec` and its archive, and `Publisher`, which runs
//! `aws lambda publish-layer-version` and parses the registered version.

pub mod config;
pub mod publish;

pub use config::PublisherConfig;
pub use publish::{parse_response, PublishOutcome, PublishRequest, Publisher};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive not found: {} (build the layer first)", .0.display())]
    ArchiveMissing(PathBuf),
    #[error("refusing to publish empty archive {}", .0.display())]
    EmptyArchive(PathBuf),
    #[error("layer '{0}' declares no compatible runtimes")]
    NoCompatibleRuntimes(String),
    #[error("unexpected registry response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Runtime(#[from] layersmith_runtime::RuntimeError),
}
