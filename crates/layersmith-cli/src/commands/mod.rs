pub mod build;
pub mod completions;
pub mod doctor;
pub mod inspect;
pub mod list;
pub mod man_pages;
pub mod publish;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use layersmith_core::{install_signal_handler, BuildConfig, Engine};
use layersmith_schema::{parse_manifest_file, LayerSpec, Manifest};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

pub const MANIFEST_ERROR_PREFIX: &str = "manifest error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn load_manifest(path: &Path) -> Result<Manifest, String> {
    parse_manifest_file(path)
        .map_err(|e| format!("{MANIFEST_ERROR_PREFIX} {}: {e}", path.display()))
}

/// Resolve `names` against the manifest; every layer when empty.
pub fn select_layers(manifest: &Manifest, names: &[String]) -> Result<Vec<LayerSpec>, String> {
    manifest
        .select(names)
        .map_err(|e| format!("{MANIFEST_ERROR_PREFIX} {e}"))
}

/// `explicit`, or `layersmith.toml` in the working directory, or defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<BuildConfig, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("cannot determine working directory: {e}"))?;
    BuildConfig::discover(explicit, &cwd).map_err(|e| e.to_string())
}

/// Engine with Ctrl-C routed to its cancellation flag.
pub fn make_engine(config: BuildConfig) -> Result<Engine, String> {
    let engine = Engine::new(config).map_err(|e| e.to_string())?;
    install_signal_handler(engine.cancellation());
    Ok(engine)
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

/// Finish `pb` with a failure line. A hidden spinner (stderr is not a
/// terminal) draws nothing, so the line goes straight to stderr instead.
pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    if pb.is_hidden() {
        pb.finish_and_clear();
        eprintln!("✗ {msg}");
        return;
    }
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "built" | "ok" | "pass" => Style::new().green().apply_to(status).to_string(),
        "failed" | "missing" | "fail" => Style::new().red().bold().apply_to(status).to_string(),
        "skipped" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn human_size(bytes: u64) -> String {
    let b = bytes as f64;
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", b / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", b / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_map() {
        let val = serde_json::json!({"layer": "utils"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"layer\""));
        assert!(result.contains("\"utils\""));
    }

    #[test]
    fn manifest_errors_carry_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("layers.yaml")).unwrap_err();
        assert!(err.starts_with(MANIFEST_ERROR_PREFIX));

        let path = dir.path().join("layers.yaml");
        std::fs::write(
            &path,
            "version: '0.3'\nlayers:\n  utils:\n    requirements: [six]\n    runtimes: python3.12\n",
        )
        .unwrap();
        let manifest = load_manifest(&path).unwrap();
        let err = select_layers(&manifest, &["nope".to_owned()]).unwrap_err();
        assert!(err.starts_with(MANIFEST_ERROR_PREFIX));
        assert!(err.contains("nope"));
    }

    #[test]
    fn missing_explicit_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.contains("absent.toml"));
    }

    #[test]
    fn colorize_status_keeps_text() {
        for status in ["built", "failed", "skipped", "ok", "missing"] {
            assert!(colorize_status(status).contains(status));
        }
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("building...");
        spin_ok(&pb, "done");
        let pb = spinner("building...");
        spin_fail(&pb, "failed");
    }
}
