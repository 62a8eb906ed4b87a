use super::{
    colorize_status, human_size, json_pretty, load_config, load_manifest, make_engine,
    select_layers, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS,
};
use indicatif::ProgressBar;
use layersmith_core::{BatchReport, BuildEvent};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flags that override `layersmith.toml` for one invocation.
#[derive(Debug, Default)]
pub struct BuildArgs {
    pub keep_going: bool,
    pub output_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
}

pub fn run(
    manifest_path: &Path,
    config_path: Option<&Path>,
    layers: &[String],
    args: BuildArgs,
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(manifest_path)?;
    let specs = select_layers(&manifest, layers)?;

    let mut config = load_config(config_path)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = Some(dir);
    }
    if args.timeout.is_some() {
        config.command_timeout_secs = args.timeout;
    }
    let engine = make_engine(config)?;
    std::fs::create_dir_all(engine.output_dir()).map_err(|e| {
        format!(
            "cannot create output directory {}: {e}",
            engine.output_dir().display()
        )
    })?;

    debug!(
        "building {} layer(s) into {}",
        specs.len(),
        engine.output_dir().display()
    );

    let mut current: Option<ProgressBar> = None;
    let report = engine.build_all_observed(&specs, args.keep_going, |event| {
        if json {
            return;
        }
        match event {
            BuildEvent::Started(spec) => {
                current = Some(spinner(&format!("building {} ({})...", spec.name, spec.runtime)));
            }
            BuildEvent::Built(built) => {
                if let Some(pb) = current.take() {
                    spin_ok(
                        &pb,
                        &format!(
                            "{} -> {} ({}, {} entries)",
                            built.layer,
                            built.archive.display(),
                            human_size(built.size_bytes),
                            built.entries
                        ),
                    );
                }
            }
            BuildEvent::Failed(e) => {
                if let Some(pb) = current.take() {
                    spin_fail(&pb, &format!("{e} [{}]", e.kind()));
                }
            }
        }
    });

    if json {
        println!("{}", json_pretty(&batch_json(&report))?);
    } else {
        print_summary(&report);
    }
    Ok(if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

fn batch_json(report: &BatchReport) -> serde_json::Value {
    serde_json::json!({
        "built": report.built,
        "failed": report.failed.iter().map(|e| serde_json::json!({
            "layer": e.layer,
            "stage": e.stage.to_string(),
            "kind": e.kind().to_string(),
            "error": e.source.to_string(),
        })).collect::<Vec<_>>(),
        "skipped": report.skipped,
    })
}

fn print_summary(report: &BatchReport) {
    for name in &report.skipped {
        println!("  {} {name}", colorize_status("skipped"));
    }
    println!(
        "{} built, {} failed, {} skipped",
        report.built.len(),
        report.failed.len(),
        report.skipped.len()
    );
}
