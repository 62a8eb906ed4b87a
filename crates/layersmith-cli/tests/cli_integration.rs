//! CLI subprocess integration tests.
//!
//! These tests invoke the `layersmith` binary as a subprocess and verify
//! exit codes, stdout content, and JSON output. Builds run against fake
//! `python3`, `pip` and `strip` scripts written into the test directory.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const MANIFEST: &str = r"version: '0.3'
default_excludes:
  - '*/tests/*'
layers:
  utils:
    requirements: [requests, six]
    runtimes: python3.11
  native:
    requirements: [native]
    runtimes: [python3.11, python3.12]
    description: compiled helpers
  web:
    requirements: [left-pad]
    runtimes: nodejs20.x
";

const FAKE_PIP: &str = r##"#!/bin/sh
venv="$(cd "$(dirname "$0")/.." && pwd)"
site="$venv/lib/python3.11/site-packages"
case "$1" in
  install)
    pkg="$2"
    if [ "$pkg" = "broken" ]; then
      echo "ERROR: No matching distribution found for broken" >&2
      exit 1
    fi
    mkdir -p "$site/$pkg/tests"
    echo "# $pkg" > "$site/$pkg/__init__.py"
    echo "def test(): pass" > "$site/$pkg/tests/test_$pkg.py"
    if [ "$pkg" = "native" ]; then
      printf 'ELF' > "$site/$pkg/_speedups.so"
    fi
    echo "$pkg" >> "$venv/.installed"
    ;;
  freeze)
    if [ -f "$venv/.installed" ]; then
      while read -r p; do echo "$p==1.0"; done < "$venv/.installed"
    fi
    ;;
  *)
    exit 2
    ;;
esac
"##;

fn layersmith_bin(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_layersmith"));
    cmd.current_dir(dir);
    cmd.env_remove("LAYERSMITH_LOG");
    cmd
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A project directory with `layers.yaml`, fake tools, and a
/// `layersmith.toml` pointing at them.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("layers.yaml"), MANIFEST).unwrap();

    let tools = root.join("tools");
    std::fs::create_dir_all(&tools).unwrap();
    let pip = tools.join("fake-pip");
    write_script(&pip, FAKE_PIP);
    let python = tools.join("python3");
    write_script(
        &python,
        &format!(
            r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "Python 3.11.4"
  exit 0
fi
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  if [ "$3" = "--help" ]; then exit 0; fi
  mkdir -p "$3/bin" "$3/lib/python3.11/site-packages"
  cp {pip} "$3/bin/pip"
  chmod +x "$3/bin/pip"
  exit 0
fi
exit 2
"#,
            pip = pip.display()
        ),
    );
    let strip = tools.join("strip");
    write_script(&strip, "#!/bin/sh\nexit 0\n");

    std::fs::write(
        root.join("layersmith.toml"),
        format!(
            "temp_root = \"{tmp}\"\noutput_dir = \"dist\"\n\n[tools]\npython = \"{python}\"\nstrip = \"{strip}\"\n",
            tmp = root.join("tmp").display(),
            python = python.display(),
            strip = strip.display()
        ),
    )
    .unwrap();
    std::fs::create_dir_all(root.join("tmp")).unwrap();
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn build(dir: &Path, args: &[&str]) -> Output {
    layersmith_bin(dir).arg("build").args(args).output().unwrap()
}

fn archive(dir: &Path, layer: &str) -> PathBuf {
    dir.join("dist").join(format!("{layer}.zip"))
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = layersmith_bin(dir.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("layersmith"));
}

#[test]
fn cli_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = layersmith_bin(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["build", "publish", "verify", "inspect", "doctor"] {
        assert!(out.contains(cmd), "help must list '{cmd}': {out}");
    }
}

#[test]
fn list_follows_manifest_order() {
    let dir = project();
    let output = layersmith_bin(dir.path())
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let layers: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let names: Vec<&str> = layers
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["utils", "native", "web"]);
    assert_eq!(layers[0]["archive"], "utils.zip");
}

#[test]
fn missing_manifest_exits_with_manifest_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = layersmith_bin(dir.path()).arg("list").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest error"));
}

#[test]
fn unsupported_manifest_version_exits_with_manifest_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("other.yaml"),
        "version: '9.9'\nlayers:\n  utils:\n    requirements: [six]\n    runtimes: python3.11\n",
    )
    .unwrap();
    let output = layersmith_bin(dir.path())
        .args(["--manifest", "other.yaml", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("9.9"));
}

#[test]
fn unknown_layer_is_rejected_before_building() {
    let dir = project();
    let output = build(dir.path(), &["nope"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("unknown layer 'nope'"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn build_named_layer_then_verify_and_inspect() {
    let dir = project();
    let output = build(dir.path(), &["utils", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["built"][0]["layer"], "utils");
    assert_eq!(report["built"][0]["runtime"], "python3.11");
    assert!(report["failed"].as_array().unwrap().is_empty());
    assert!(archive(dir.path(), "utils").is_file());
    assert!(!archive(dir.path(), "native").exists());

    let zip = archive(dir.path(), "utils");
    let output = layersmith_bin(dir.path())
        .arg("verify")
        .arg(&zip)
        .args([
            "python/lib/python3.11/site-packages/requests/__init__.py",
            "python/lib/python3.11/site-packages/six/__init__.py",
            "python/requirements.txt",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stdout(&output));

    let output = layersmith_bin(dir.path())
        .arg("verify")
        .arg(&zip)
        .args([
            "python/lib/python3.11/site-packages/requests/tests/test_requests.py",
            "--json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        result["missing"][0],
        "python/lib/python3.11/site-packages/requests/tests/test_requests.py"
    );

    let output = layersmith_bin(dir.path())
        .args(["inspect", "--json"])
        .arg(&zip)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let meta: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(meta["name"], "utils");
    assert_eq!(meta["requirements"], serde_json::json!(["requests", "six"]));
    assert_eq!(meta["excludes"], serde_json::json!(["*/tests/*"]));
}

#[test]
fn named_layers_build_in_manifest_order() {
    let dir = project();
    // No node toolchain, so the node layer fails validation.
    let config = std::fs::read_to_string(dir.path().join("layersmith.toml")).unwrap();
    std::fs::write(
        dir.path().join("layersmith.toml"),
        config.replace("[tools]\n", "[tools]\nnode = \"/nonexistent/node\"\n"),
    )
    .unwrap();

    let output = build(dir.path(), &["web", "utils", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["built"][0]["layer"], "utils");
    assert_eq!(report["failed"][0]["layer"], "web");
    assert_eq!(report["failed"][0]["stage"], "validate");
}

#[test]
fn keep_going_builds_remaining_layers() {
    let dir = project();
    std::fs::write(
        dir.path().join("layers.yaml"),
        "version: '0.3'\nlayers:\n  bad:\n    requirements: [broken]\n    runtimes: python3.11\n  good:\n    requirements: [six]\n    runtimes: python3.11\n",
    )
    .unwrap();

    let output = build(dir.path(), &["--json"]);
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["failed"][0]["layer"], "bad");
    assert_eq!(report["failed"][0]["stage"], "install");
    assert_eq!(report["skipped"], serde_json::json!(["good"]));
    assert!(!archive(dir.path(), "good").exists());

    let output = build(dir.path(), &["--keep-going", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["built"][0]["layer"], "good");
    assert!(report["skipped"].as_array().unwrap().is_empty());
    assert!(archive(dir.path(), "good").is_file());
}

#[test]
fn failed_layers_are_named_on_stderr_without_terminal() {
    let dir = project();
    std::fs::write(
        dir.path().join("layers.yaml"),
        "version: '0.3'\nlayers:\n  bad:\n    requirements: [broken]\n    runtimes: python3.11\n  mism:\n    requirements: [six]\n    runtimes: python3.9\n",
    )
    .unwrap();

    let output = build(dir.path(), &["--keep-going"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("0 built, 2 failed, 0 skipped"));
    let err = stderr(&output);
    assert!(err.contains("layer 'bad' failed at install"), "{err}");
    assert!(err.contains("layer 'mism' failed at validate"), "{err}");
    assert!(err.contains("[runtime-mismatch]"), "{err}");
}

#[test]
fn output_dir_flag_overrides_config() {
    let dir = project();
    let output = build(dir.path(), &["utils", "--output-dir", "elsewhere"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(dir.path().join("elsewhere/utils.zip").is_file());
    assert!(stdout(&output).contains("1 built, 0 failed, 0 skipped"));
}

#[test]
fn publish_without_archive_fails() {
    let dir = project();
    let output = layersmith_bin(dir.path())
        .args(["publish", "utils", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["failed"][0]["layer"], "utils");
}

#[test]
fn publish_uses_configured_registry_program() {
    let dir = project();
    let aws = dir.path().join("tools/aws");
    write_script(
        &aws,
        r#"#!/bin/sh
echo '{"LayerArn":"arn:aws:lambda:eu-west-1:1:layer:utils","LayerVersionArn":"arn:aws:lambda:eu-west-1:1:layer:utils:7","Version":7}'
"#,
    );
    let config = std::fs::read_to_string(dir.path().join("layersmith.toml")).unwrap();
    std::fs::write(
        dir.path().join("layersmith.toml"),
        format!("{config}\n[registry]\nprogram = \"{}\"\n", aws.display()),
    )
    .unwrap();

    let output = build(dir.path(), &["utils"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = layersmith_bin(dir.path())
        .args(["publish", "utils", "--region", "eu-west-1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["published"][0]["version"], 7);
}

#[test]
fn publish_with_relative_output_dir_passes_existing_archive() {
    let dir = project();
    let aws = dir.path().join("tools/aws");
    write_script(
        &aws,
        r#"#!/bin/sh
for a in "$@"; do
  case "$a" in
    fileb://*)
      if [ ! -f "${a#fileb://}" ]; then
        echo "Error parsing parameter '--zip-file': Unable to load paramfile $a" >&2
        exit 255
      fi
      ;;
  esac
done
echo '{"LayerVersionArn":"arn:aws:lambda:eu-west-1:1:layer:utils:2","Version":2}'
"#,
    );
    let config = std::fs::read_to_string(dir.path().join("layersmith.toml")).unwrap();
    std::fs::write(
        dir.path().join("layersmith.toml"),
        format!("{config}\n[registry]\nprogram = \"{}\"\n", aws.display()),
    )
    .unwrap();

    let output = build(dir.path(), &["utils", "--output-dir", "out"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(dir.path().join("out/utils.zip").is_file());

    let output = layersmith_bin(dir.path())
        .args(["publish", "utils", "--output-dir", "out", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}{}",
        stdout(&output),
        stderr(&output)
    );
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["published"][0]["version"], 2);
}

#[test]
fn publish_failure_shows_registry_error() {
    let dir = project();
    let aws = dir.path().join("tools/aws");
    write_script(
        &aws,
        "#!/bin/sh\necho 'An error occurred (AccessDeniedException) when calling the PublishLayerVersion operation' >&2\nexit 255\n",
    );
    let config = std::fs::read_to_string(dir.path().join("layersmith.toml")).unwrap();
    std::fs::write(
        dir.path().join("layersmith.toml"),
        format!("{config}\n[registry]\nprogram = \"{}\"\n", aws.display()),
    )
    .unwrap();

    let output = build(dir.path(), &["utils"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = layersmith_bin(dir.path())
        .args(["publish", "utils"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("0 published, 1 failed"));
    let err = stderr(&output);
    assert!(err.contains("utils:"), "{err}");
    assert!(err.contains("AccessDeniedException"), "{err}");
}

#[test]
fn doctor_reports_missing_tools() {
    let dir = project();
    std::fs::write(
        dir.path().join("layersmith.toml"),
        "[tools]\nnode = \"/nonexistent/node\"\nnpm = \"/nonexistent/npm\"\n",
    )
    .unwrap();
    let output = layersmith_bin(dir.path())
        .args(["doctor", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["healthy"], false);
    assert!(stdout(&output).contains("/nonexistent/node"));
}

#[test]
fn completions_generate_for_bash() {
    let dir = tempfile::tempdir().unwrap();
    let output = layersmith_bin(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("layersmith"));
}

#[test]
fn man_pages_written_per_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let output = layersmith_bin(dir.path())
        .args(["man-pages", "man"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("man/layersmith.1").is_file());
    assert!(dir.path().join("man/layersmith-build.1").is_file());
}
