use crate::ArtifactError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WORKSPACE_PREFIX: &str = "layersmith-";
const LOG_FILE: &str = "build.log";

/// Exclusively owned scratch tree for one layer build.
///
/// Layout:
/// ```text
/// <temp_root>/layersmith-<uuid>/
///   <payload_dir>/     archive contents
///   build.log          child process output
///   ...                installer scratch state (venv, npm prefix, caches)
/// ```
///
/// The tree is removed by [`release`](Self::release). If a workspace is
/// dropped without being released, the drop removes it instead.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    payload_root: PathBuf,
    origin: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a fresh, uniquely named tree under `temp_root` with an empty
    /// payload root. `origin` is where the finished archive is written.
    pub fn acquire(temp_root: &Path, origin: &Path, payload_dir: &str) -> Result<Self, ArtifactError> {
        let acquire_err = |source| ArtifactError::WorkspaceAcquire {
            root: temp_root.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(temp_root).map_err(acquire_err)?;
        let root = temp_root.join(format!("{WORKSPACE_PREFIX}{}", uuid::Uuid::new_v4()));
        // create_dir, not create_dir_all: an existing directory is a collision.
        std::fs::create_dir(&root).map_err(acquire_err)?;

        let payload_root = root.join(payload_dir);
        let workspace = Self {
            root,
            payload_root,
            origin: origin.to_path_buf(),
            released: false,
        };
        std::fs::create_dir(&workspace.payload_root).map_err(acquire_err)?;
        debug!("acquired workspace {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_root(&self) -> &Path {
        &self.payload_root
    }

    /// Directory the archive must land in so it outlives the workspace.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Name of the payload directory, which prefixes every archive entry.
    pub fn payload_dir_name(&self) -> &str {
        self.payload_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Recursively delete the whole tree.
    pub fn release(mut self) -> Result<(), ArtifactError> {
        self.released = true;
        remove_tree(&self.root)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "workspace {} dropped without release, removing",
            self.root.display()
        );
        if let Err(e) = remove_tree(&self.root) {
            warn!("{e}");
        }
    }
}

fn remove_tree(root: &Path) -> Result<(), ArtifactError> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => {
            debug!("released workspace {}", root.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ArtifactError::WorkspaceRelease {
            path: root.to_path_buf(),
            source,
        }),
    }
}
