use crate::exec::{self, ExecOptions};
use crate::installer::{move_dir, path_with, InstallContext, RuntimeInstaller};
use crate::RuntimeError;
use layersmith_schema::{RuntimeFamily, RuntimeTag};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

const VENV_DIR: &str = "venv";

/// Installs requirements with pip into a virtual environment created inside
/// the workspace, then moves the venv's `lib/` under `python/`.
pub struct PythonInstaller {
    python: String,
    shell: String,
}

impl PythonInstaller {
    pub fn new(python: &str, shell: &str) -> Self {
        Self {
            python: python.to_owned(),
            shell: shell.to_owned(),
        }
    }

    fn venv_dir(ctx: &InstallContext) -> PathBuf {
        ctx.workspace.join(VENV_DIR)
    }

    fn pip(&self, ctx: &InstallContext) -> Command {
        let mut cmd = Command::new(Self::venv_dir(ctx).join("bin").join("pip"));
        cmd.current_dir(&ctx.workspace)
            .envs(self.environment(ctx))
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .env("PIP_NO_INPUT", "1");
        if ctx.isolate_caches {
            cmd.env("PIP_CACHE_DIR", ctx.cache_dir("pip"));
        }
        cmd
    }
}

impl RuntimeInstaller for PythonInstaller {
    fn family(&self) -> RuntimeFamily {
        RuntimeFamily::Python
    }

    fn shell(&self) -> &str {
        &self.shell
    }

    fn detect(&self, exec: &ExecOptions) -> Result<RuntimeTag, RuntimeError> {
        let output = exec::capture(Command::new(&self.python).arg("--version"), exec)?;
        // Python 2 printed its version on stderr.
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let (major, minor) =
            parse_python_version(&text).ok_or_else(|| RuntimeError::UnrecognizedVersion {
                tool: self.python.clone(),
                output: text.trim().to_owned(),
            })?;
        Ok(RuntimeTag::python(major, minor))
    }

    fn prepare_environment(&self, ctx: &InstallContext) -> Result<(), RuntimeError> {
        let venv = Self::venv_dir(ctx);
        info!("creating virtualenv at {}", venv.display());
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "venv"]).arg(&venv).current_dir(&ctx.workspace);
        exec::run(&mut cmd, &ctx.exec)
    }

    fn environment(&self, ctx: &InstallContext) -> Vec<(String, OsString)> {
        let venv = Self::venv_dir(ctx);
        vec![
            (
                "LAYERSMITH_WORKSPACE".to_owned(),
                ctx.workspace.clone().into_os_string(),
            ),
            (
                "LAYERSMITH_PAYLOAD".to_owned(),
                ctx.payload_root.clone().into_os_string(),
            ),
            ("PATH".to_owned(), path_with(&venv.join("bin"))),
            ("VIRTUAL_ENV".to_owned(), venv.into_os_string()),
        ]
    }

    fn install_all(&self, ctx: &InstallContext, requirements: &[String]) -> Result<(), RuntimeError> {
        for requirement in requirements {
            info!("pip install {requirement}");
            exec::run(self.pip(ctx).arg("install").arg(requirement), &ctx.exec)?;
        }
        Ok(())
    }

    fn snapshot(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        let path = self.snapshot_path(ctx);
        exec::run_to_file(self.pip(ctx).arg("freeze"), &path, &ctx.exec)?;
        Ok(path)
    }

    fn relocate(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        move_dir(
            &Self::venv_dir(ctx).join("lib"),
            &ctx.payload_root.join("lib"),
        )
    }
}

/// Extract `(major, minor)` from `Python 3.12.1` style output.
pub fn parse_python_version(output: &str) -> Option<(u32, u32)> {
    let version = output
        .split_whitespace()
        .skip_while(|w| !w.eq_ignore_ascii_case("python"))
        .nth(1)?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    Some((major, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_version() {
        assert_eq!(parse_python_version("Python 3.12.1\n"), Some((3, 12)));
    }

    #[test]
    fn parses_prerelease_version() {
        assert_eq!(parse_python_version("Python 3.13.0rc2"), Some((3, 13)));
        assert_eq!(parse_python_version("Python 3.14a1"), Some((3, 14)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_python_version(""), None);
        assert_eq!(parse_python_version("command not found"), None);
        assert_eq!(parse_python_version("Python three"), None);
    }

    #[test]
    fn hooks_see_virtualenv_first_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = InstallContext::new(dir.path(), dir.path().join("python"));
        let installer = PythonInstaller::new("python3", "/bin/sh");
        let env = installer.environment(&ctx);
        let path = env
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.to_string_lossy().into_owned())
            .unwrap();
        assert!(path.starts_with(&dir.path().join("venv/bin").display().to_string()));
        assert!(env.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
    }

    #[test]
    fn detect_fails_for_missing_interpreter() {
        let installer = PythonInstaller::new("/nonexistent/python3", "/bin/sh");
        assert!(matches!(
            installer.detect(&ExecOptions::default()),
            Err(RuntimeError::ToolMissing { .. })
        ));
    }

    #[test]
    fn snapshot_path_is_inside_payload() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = InstallContext::new(dir.path(), dir.path().join("python"));
        let installer = PythonInstaller::new("python3", "/bin/sh");
        assert_eq!(
            installer.snapshot_path(&ctx),
            dir.path().join("python/requirements.txt")
        );
    }
}
