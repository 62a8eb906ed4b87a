use super::{colorize_status, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use layersmith_artifact::missing_entries;
use std::path::Path;

/// Check `files` against the entries of `archive`, one line per file.
pub fn run(archive: &Path, files: &[String], json: bool) -> Result<u8, String> {
    let missing = missing_entries(archive, files)
        .map_err(|e| format!("cannot read {}: {e}", archive.display()))?;

    if json {
        let payload = serde_json::json!({
            "archive": archive,
            "checked": files.len(),
            "missing": missing,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for file in files {
            if missing.contains(file) {
                println!("{} {file} not found in {}", colorize_status("missing"), archive.display());
            } else {
                println!("{} {file}", colorize_status("ok"));
            }
        }
    }
    Ok(if missing.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
