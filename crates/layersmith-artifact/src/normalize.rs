//! Post-install cleanup of the payload tree.

use crate::ArtifactError;
use layersmith_runtime::exec::{self, ExecOptions};
use layersmith_schema::{render_metadata, LayerSpec, METADATA_FILE_NAME};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub stripped: Vec<PathBuf>,
    pub metadata: PathBuf,
}

/// Strip native libraries, then embed the effective layer configuration.
pub fn normalize(
    payload_root: &Path,
    spec: &LayerSpec,
    strip_program: &str,
    exec: &ExecOptions,
) -> Result<NormalizeReport, ArtifactError> {
    let stripped = strip_shared_libraries(payload_root, strip_program, exec)?;
    let metadata = embed_metadata(payload_root, spec)?;
    Ok(NormalizeReport { stripped, metadata })
}

/// `foo.so`, `libfoo.so.1`, `libfoo.so.1.2.3`.
pub fn is_shared_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(idx) = name.rfind(".so") else {
        return false;
    };
    if idx == 0 {
        return false;
    }
    let rest = &name[idx + 3..];
    rest.is_empty()
        || rest.strip_prefix('.').is_some_and(|version| {
            version
                .split('.')
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        })
}

/// Run `strip_program` on every shared library under `payload_root`.
///
/// Symlinked libraries are skipped; their targets are stripped when the
/// walk reaches them. Returns the stripped paths in walk order.
pub fn strip_shared_libraries(
    payload_root: &Path,
    strip_program: &str,
    exec: &ExecOptions,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut libraries = Vec::new();
    for entry in WalkDir::new(payload_root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_shared_library(entry.path()) {
            libraries.push(entry.into_path());
        }
    }

    if libraries.is_empty() {
        debug!("no native libraries to strip");
        return Ok(libraries);
    }

    info!("stripping {} native libraries", libraries.len());
    for lib in &libraries {
        let mut cmd = Command::new(strip_program);
        cmd.arg(lib).current_dir(payload_root);
        exec::run(&mut cmd, exec)?;
    }
    Ok(libraries)
}

/// Write `layer.yaml` at the payload root.
pub fn embed_metadata(payload_root: &Path, spec: &LayerSpec) -> Result<PathBuf, ArtifactError> {
    let path = payload_root.join(METADATA_FILE_NAME);
    std::fs::write(&path, render_metadata(spec)?)?;
    debug!("embedded layer metadata at {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersmith_schema::parse_metadata;

    #[test]
    fn shared_library_names() {
        assert!(is_shared_library(Path::new("lib/_speedups.so")));
        assert!(is_shared_library(Path::new("libxml2.so.2")));
        assert!(is_shared_library(Path::new("libssl.so.1.1")));
        assert!(is_shared_library(Path::new("_cffi.cpython-312-x86_64-linux-gnu.so")));
        assert!(!is_shared_library(Path::new("module.py")));
        assert!(!is_shared_library(Path::new("notes.source")));
        assert!(!is_shared_library(Path::new("lib.so.bak")));
        assert!(!is_shared_library(Path::new(".so")));
        assert!(is_shared_library(Path::new("x.source.so")));
    }

    #[test]
    fn strips_every_library_with_configured_program() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("python");
        std::fs::create_dir_all(root.join("lib/a")).unwrap();
        std::fs::create_dir_all(root.join("lib/b/deep")).unwrap();
        std::fs::write(root.join("lib/a/x.so"), "elf").unwrap();
        std::fs::write(root.join("lib/b/deep/libz.so.1"), "elf").unwrap();
        std::fs::write(root.join("lib/b/mod.py"), "").unwrap();

        // A fake strip that records what it was given.
        let record = dir.path().join("stripped.txt");
        let strip = dir.path().join("fake-strip");
        std::fs::write(
            &strip,
            format!("#!/bin/sh\necho \"$1\" >> {}\n", record.display()),
        )
        .unwrap();
        make_executable(&strip);

        let stripped =
            strip_shared_libraries(&root, strip.to_str().unwrap(), &ExecOptions::default()).unwrap();
        assert_eq!(stripped.len(), 2);
        let recorded = std::fs::read_to_string(&record).unwrap();
        assert!(recorded.contains("x.so"));
        assert!(recorded.contains("libz.so.1"));
        assert!(!recorded.contains("mod.py"));
    }

    #[test]
    fn no_libraries_means_no_strip_invocation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "").unwrap();
        let stripped =
            strip_shared_libraries(dir.path(), "/nonexistent/strip", &ExecOptions::default())
                .unwrap();
        assert!(stripped.is_empty());
    }

    #[test]
    fn strip_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.so"), "").unwrap();
        let err = strip_shared_libraries(dir.path(), "false", &ExecOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Runtime(_)));
    }

    #[test]
    fn metadata_is_readable_back() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LayerSpec::new("utils", "python3.12")
            .with_requirements(["requests"])
            .with_excludes(["*.pyc"]);
        let path = embed_metadata(dir.path(), &spec).unwrap();
        assert_eq!(path, dir.path().join("layer.yaml"));
        let parsed = parse_metadata(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, spec);
    }

    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }
}
