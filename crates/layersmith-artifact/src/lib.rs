//! Build workspaces, payload normalization, and archive packaging for layersmith.
//!
//! This crate provides the artifact layer: `Workspace` for the per-build
//! ephemeral directory tree and its guaranteed cleanup, the normalizer that
//! strips native libraries and embeds `layer.yaml`, the deterministic zip
//! packager with glob exclusions, and read-only inspection of produced
//! archives.

pub mod inspect;
pub mod normalize;
pub mod package;
pub mod workspace;

pub use inspect::{list_entries, missing_entries, read_metadata};
pub use normalize::{
    embed_metadata, is_shared_library, normalize, strip_shared_libraries, NormalizeReport,
};
pub use package::{file_digest, package, ArchiveInfo, ExcludeFilter};
pub use workspace::{Workspace, WORKSPACE_PREFIX};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot create workspace under {}: {source}", .root.display())]
    WorkspaceAcquire {
        root: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove workspace {}: {source}", .path.display())]
    WorkspaceRelease {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("archive {} is empty", .0.display())]
    EmptyArchive(PathBuf),
    #[error("archive has no layer metadata ({0})")]
    MissingMetadata(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Schema(#[from] layersmith_schema::SchemaError),
    #[error(transparent)]
    Runtime(#[from] layersmith_runtime::RuntimeError),
}
