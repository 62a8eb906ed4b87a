use super::{
    json_pretty, load_config, load_manifest, make_engine, select_layers, spin_fail, spin_ok,
    spinner, EXIT_FAILURE, EXIT_SUCCESS,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct PublishArgs {
    pub output_dir: Option<PathBuf>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

pub fn run(
    manifest_path: &Path,
    config_path: Option<&Path>,
    layers: &[String],
    args: PublishArgs,
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(manifest_path)?;
    let specs = select_layers(&manifest, layers)?;

    let mut config = load_config(config_path)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = Some(dir);
    }
    if let Some(region) = args.region {
        config.registry.region = Some(region);
    }
    if let Some(profile) = args.profile {
        config.registry.profile = Some(profile);
    }
    let engine = make_engine(config)?;

    let mut published = Vec::new();
    let mut failed = Vec::new();
    for spec in &specs {
        let pb = (!json).then(|| spinner(&format!("publishing {}...", spec.name)));
        match engine.publish(spec) {
            Ok(outcome) => {
                if let Some(ref pb) = pb {
                    spin_ok(
                        pb,
                        &format!(
                            "{} version {} ({})",
                            spec.name, outcome.version, outcome.layer_version_arn
                        ),
                    );
                }
                published.push(serde_json::json!({
                    "layer": spec.name,
                    "layer_version_arn": outcome.layer_version_arn,
                    "version": outcome.version,
                }));
            }
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("{}: {e}", spec.name));
                }
                failed.push(serde_json::json!({
                    "layer": spec.name,
                    "error": e.to_string(),
                }));
                if engine.cancellation().is_cancelled() {
                    break;
                }
            }
        }
    }

    if json {
        let payload = serde_json::json!({
            "published": published,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{} published, {} failed", published.len(), failed.len());
    }
    Ok(if failed.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
