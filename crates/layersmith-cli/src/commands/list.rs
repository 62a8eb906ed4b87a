use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use std::path::Path;

pub fn run(manifest_path: &Path, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(manifest_path)?;
    let specs = manifest.layer_specs();
    if json {
        let layers: Vec<_> = specs
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "runtime": s.runtime,
                    "requirements": s.requirements.len(),
                    "archive": s.archive_file_name(),
                })
            })
            .collect();
        println!("{}", json_pretty(&layers)?);
    } else {
        println!("{:<24} {:<14} REQUIREMENTS", "NAME", "RUNTIME");
        for spec in &specs {
            println!(
                "{:<24} {:<14} {}",
                spec.name,
                spec.runtime,
                spec.requirements.len()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
