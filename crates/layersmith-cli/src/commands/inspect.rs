use super::{json_pretty, EXIT_SUCCESS};
use layersmith_artifact::{list_entries, read_metadata};
use std::path::Path;

pub fn run(archive: &Path, json: bool) -> Result<u8, String> {
    let spec = read_metadata(archive).map_err(|e| format!("{}: {e}", archive.display()))?;
    let entries = list_entries(archive)
        .map_err(|e| format!("{}: {e}", archive.display()))?
        .len();

    if json {
        let payload = serde_json::json!({
            "name": spec.name,
            "runtime": spec.runtime,
            "compatible_runtimes": spec.compatible_runtimes,
            "requirements": spec.requirements,
            "excludes": spec.excludes,
            "pre_installs": spec.pre_install_commands,
            "description": spec.description,
            "entries": entries,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("layer:        {}", spec.name);
        println!("runtime:      {}", spec.runtime);
        println!("compatible:   {}", spec.compatible_runtimes.join(", "));
        println!("description:  {}", spec.description.trim());
        println!("entries:      {entries}");
        println!("requirements:");
        for req in &spec.requirements {
            println!("  {req}");
        }
        if !spec.excludes.is_empty() {
            println!("excludes:");
            for pattern in &spec.excludes {
                println!("  {pattern}");
            }
        }
        if !spec.pre_install_commands.is_empty() {
            println!("pre-installs:");
            for cmd in &spec.pre_install_commands {
                println!("  {cmd}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
