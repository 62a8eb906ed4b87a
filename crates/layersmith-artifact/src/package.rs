//! Deterministic zip packaging of a workspace payload.
//!
//! Entry names are relative to the workspace root, so every entry starts
//! with the payload directory (`python/...`, `nodejs/...`) and the archive
//! unpacks into the layout the serverless runtime mounts. Entries are
//! written in sorted walk order with a fixed timestamp, so rebuilding an
//! unchanged tree yields the same entry list.

use crate::ArtifactError;
use glob::{MatchOptions, Pattern};
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const COMPRESSION_LEVEL: i64 = 9;

/// A produced archive and what was learned while writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// blake3 of the archive file, hex encoded.
    pub digest: String,
    pub entries: usize,
}

/// Glob patterns matched against full entry names.
///
/// `*` also matches `/`, so `*/tests/*` drops test directories at any depth.
/// Directory entries carry a trailing `/`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Pattern>,
}

impl ExcludeFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ArtifactError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|source| ArtifactError::InvalidPattern {
                    pattern: p.as_ref().to_owned(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, entry_name: &str) -> bool {
        let opts = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(entry_name, opts))
    }
}

/// Zip `<workspace_root>/<payload_dir>` into `dest`.
///
/// The archive is assembled in a temporary file beside `dest` and renamed
/// into place, so `dest` never holds a partial archive.
pub fn package<S: AsRef<str>>(
    workspace_root: &Path,
    payload_dir: &str,
    excludes: &[S],
    dest: &Path,
) -> Result<ArchiveInfo, ArtifactError> {
    let filter = ExcludeFilter::new(excludes)?;
    let dest_dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dest_dir)?;

    let mut tmp = NamedTempFile::new_in(&dest_dir)?;
    let entries = write_archive(tmp.as_file_mut(), workspace_root, payload_dir, &filter)?;
    tmp.as_file().sync_all()?;

    if entries == 0 {
        return Err(ArtifactError::EmptyArchive(dest.to_path_buf()));
    }
    tmp.persist(dest).map_err(|e| ArtifactError::Io(e.error))?;

    let size_bytes = std::fs::metadata(dest)?.len();
    if size_bytes == 0 {
        return Err(ArtifactError::EmptyArchive(dest.to_path_buf()));
    }
    let digest = file_digest(dest)?;
    info!(
        "packaged {} ({entries} entries, {size_bytes} bytes)",
        dest.display()
    );
    Ok(ArchiveInfo {
        path: dest.to_path_buf(),
        size_bytes,
        digest,
        entries,
    })
}

fn write_archive(
    out: &mut File,
    workspace_root: &Path,
    payload_dir: &str,
    filter: &ExcludeFilter,
) -> Result<usize, ArtifactError> {
    let base = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(out);
    let mut count = 0usize;
    let walker = WalkDir::new(workspace_root.join(payload_dir))
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let name = entry_name(workspace_root, entry.path())?;
        let ft = entry.file_type();
        let name = if ft.is_dir() { format!("{name}/") } else { name };
        if filter.is_excluded(&name) {
            debug!("excluded {name}");
            continue;
        }

        let mode = entry.path().symlink_metadata()?.permissions().mode() & 0o7777;
        let options = base.unix_permissions(mode);
        if ft.is_dir() {
            zip.add_directory(name.as_str(), options)?;
        } else if ft.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            let target = target
                .to_str()
                .ok_or_else(|| ArtifactError::NonUtf8Path(target.clone()))?;
            zip.add_symlink(name.as_str(), target, options)?;
        } else if ft.is_file() {
            zip.start_file(name.as_str(), options)?;
            let mut src = File::open(entry.path())?;
            std::io::copy(&mut src, &mut zip)?;
        } else {
            debug!("skipping unsupported file type: {name}");
            continue;
        }
        count += 1;
    }

    zip.finish()?.flush()?;
    Ok(count)
}

/// `/`-separated path of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String, ArtifactError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| ArtifactError::Io(std::io::Error::other(format!("path strip: {e}"))))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| ArtifactError::NonUtf8Path(path.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// blake3 of a file's contents, hex encoded.
pub fn file_digest(path: &Path) -> Result<String, ArtifactError> {
    let mut hasher = blake3::Hasher::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
