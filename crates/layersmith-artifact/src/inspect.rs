//! Read-only queries against produced archives.

use crate::ArtifactError;
use layersmith_schema::{parse_metadata, LayerSpec, RuntimeFamily, METADATA_FILE_NAME};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArtifactError> {
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Entry names in archive order.
pub fn list_entries(path: &Path) -> Result<Vec<String>, ArtifactError> {
    let archive = open(path)?;
    Ok(archive.file_names().map(str::to_owned).collect())
}

/// The subset of `expected` that has no entry in the archive, in the order
/// given.
pub fn missing_entries<S: AsRef<str>>(
    path: &Path,
    expected: &[S],
) -> Result<Vec<String>, ArtifactError> {
    let present: HashSet<String> = list_entries(path)?.into_iter().collect();
    Ok(expected
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !present.contains(*name))
        .map(str::to_owned)
        .collect())
}

/// Recover the layer configuration embedded at build time.
pub fn read_metadata(path: &Path) -> Result<LayerSpec, ArtifactError> {
    let mut archive = open(path)?;
    let candidates: Vec<String> = RuntimeFamily::ALL
        .iter()
        .map(|f| format!("{}/{METADATA_FILE_NAME}", f.payload_dir()))
        .collect();
    let Some(name) = candidates
        .iter()
        .find(|c| archive.index_for_name(c.as_str()).is_some())
    else {
        return Err(ArtifactError::MissingMetadata(candidates.join(", ")));
    };

    let mut content = String::new();
    archive.by_name(name)?.read_to_string(&mut content)?;
    Ok(parse_metadata(&content)?)
}
