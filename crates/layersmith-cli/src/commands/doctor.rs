use super::{load_config, load_manifest, EXIT_FAILURE, EXIT_SUCCESS};
use layersmith_core::{BuildConfig, Engine};
use layersmith_runtime::format_missing;
use layersmith_schema::RuntimeFamily;
use std::path::Path;

pub fn run(manifest_path: &Path, config_path: Option<&Path>, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let families = manifest_families(manifest_path, &mut checks)?;
    let config = load_config(config_path)?;
    checks.push(Check::pass("config", "Configuration loaded"));

    check_temp_root(&config, &mut checks, &mut all_pass);

    let engine = Engine::new(config).map_err(|e| e.to_string())?;
    let missing = engine.missing_prerequisites(&families);
    if missing.is_empty() {
        let names: Vec<String> = families.iter().map(ToString::to_string).collect();
        checks.push(Check::pass(
            "prereqs",
            &format!("Host tools for {} layers present", names.join(" and ")),
        ));
    } else {
        all_pass = false;
        checks.push(Check::fail("prereqs", &format_missing(&missing)));
    }

    print_results(&checks, all_pass, json_output)
}

/// Runtime families used by the manifest, or every family when there is
/// no manifest to read.
fn manifest_families(path: &Path, checks: &mut Vec<Check>) -> Result<Vec<RuntimeFamily>, String> {
    if !path.exists() {
        checks.push(Check::info(
            "manifest",
            &format!(
                "No manifest at {}, checking tools for every runtime",
                path.display()
            ),
        ));
        return Ok(RuntimeFamily::ALL.to_vec());
    }
    let manifest = load_manifest(path)?;
    let mut families = Vec::new();
    for spec in manifest.layer_specs() {
        match RuntimeFamily::from_tag(&spec.runtime) {
            Some(f) if !families.contains(&f) => families.push(f),
            Some(_) => {}
            None => checks.push(Check::warn(
                &format!("layer_{}", spec.name),
                &format!(
                    "Layer '{}' has no buildable runtime ('{}')",
                    spec.name, spec.runtime
                ),
            )),
        }
    }
    checks.push(Check::pass(
        "manifest",
        &format!("Manifest {} parsed", path.display()),
    ));
    Ok(families)
}

fn check_temp_root(config: &BuildConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match tempfile::tempdir_in(&config.temp_root) {
        Ok(_) => checks.push(Check::pass(
            "temp_root",
            &format!("Workspace root {} is writable", config.temp_root.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "temp_root",
                &format!(
                    "Workspace root {} is not writable: {e}",
                    config.temp_root.display()
                ),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", super::json_pretty(&json)?);
    } else {
        println!("layersmith doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
