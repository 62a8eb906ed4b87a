use crate::exec::{self, ExecOptions};
use crate::RuntimeError;
use layersmith_schema::{LayerSpec, RuntimeFamily, RuntimeTag};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Host programs the installers invoke. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toolchain {
    pub python: String,
    pub node: String,
    pub npm: String,
    pub shell: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            python: "python3".to_owned(),
            node: "node".to_owned(),
            npm: "npm".to_owned(),
            shell: "/bin/sh".to_owned(),
        }
    }
}

/// Paths and execution settings for one install inside one workspace.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub workspace: PathBuf,
    pub payload_root: PathBuf,
    pub exec: ExecOptions,
    /// Point package-manager caches into the workspace instead of the
    /// shared per-user cache.
    pub isolate_caches: bool,
}

impl InstallContext {
    pub fn new(workspace: impl Into<PathBuf>, payload_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            payload_root: payload_root.into(),
            exec: ExecOptions::default(),
            isolate_caches: false,
        }
    }

    #[must_use]
    pub fn with_exec(mut self, exec: ExecOptions) -> Self {
        self.exec = exec;
        self
    }

    #[must_use]
    pub fn with_isolated_caches(mut self, isolate: bool) -> Self {
        self.isolate_caches = isolate;
        self
    }

    pub fn cache_dir(&self, tool: &str) -> PathBuf {
        self.workspace.join("cache").join(tool)
    }
}

/// One runtime family's strategy for turning a requirement list into a
/// payload tree.
///
/// Stages run in the order of [`install`](Self::install). Any error aborts
/// the remaining stages.
pub trait RuntimeInstaller: Send + Sync {
    fn family(&self) -> RuntimeFamily;

    /// Shell used for pre-install hooks.
    fn shell(&self) -> &str;

    /// Determine the runtime tag of the locally available toolchain.
    fn detect(&self, exec: &ExecOptions) -> Result<RuntimeTag, RuntimeError>;

    /// Refuse to build if the local toolchain does not match the declared tag.
    fn validate(&self, declared: &RuntimeTag, exec: &ExecOptions) -> Result<(), RuntimeError> {
        if declared.family() != self.family() {
            return Err(RuntimeError::WrongFamily {
                installer: self.family().to_string(),
                runtime: declared.to_string(),
            });
        }
        let actual = self.detect(exec)?;
        if !declared.matches(&actual) {
            return Err(RuntimeError::RuntimeMismatch {
                declared: declared.to_string(),
                actual: actual.to_string(),
            });
        }
        debug!("local toolchain {actual} satisfies {declared}");
        Ok(())
    }

    /// Create the isolated environment the install writes into.
    fn prepare_environment(&self, ctx: &InstallContext) -> Result<(), RuntimeError>;

    /// Environment variables for hooks and installer commands.
    fn environment(&self, ctx: &InstallContext) -> Vec<(String, OsString)> {
        vec![
            (
                "LAYERSMITH_WORKSPACE".to_owned(),
                ctx.workspace.clone().into_os_string(),
            ),
            (
                "LAYERSMITH_PAYLOAD".to_owned(),
                ctx.payload_root.clone().into_os_string(),
            ),
        ]
    }

    /// Run hooks through the shell in declared order, stopping at the first
    /// failure.
    fn run_pre_install(&self, ctx: &InstallContext, commands: &[String]) -> Result<(), RuntimeError> {
        for (i, hook) in commands.iter().enumerate() {
            info!("pre-install [{}/{}]: {hook}", i + 1, commands.len());
            let mut cmd = Command::new(self.shell());
            cmd.arg("-c")
                .arg(hook)
                .current_dir(&ctx.workspace)
                .envs(self.environment(ctx));
            exec::run(&mut cmd, &ctx.exec)?;
        }
        Ok(())
    }

    /// Install each requirement with its own tool invocation, in order.
    fn install_all(&self, ctx: &InstallContext, requirements: &[String]) -> Result<(), RuntimeError>;

    /// Write the tool's own listing of installed packages into the payload
    /// root. Returns the snapshot path.
    fn snapshot(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError>;

    /// Move the installed dependency tree under the payload root. Returns
    /// the relocated directory.
    fn relocate(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError>;

    fn snapshot_path(&self, ctx: &InstallContext) -> PathBuf {
        ctx.payload_root.join(self.family().snapshot_file())
    }

    /// Full install sequence for one layer.
    fn install(&self, ctx: &InstallContext, spec: &LayerSpec) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&ctx.payload_root)?;
        self.prepare_environment(ctx)?;
        self.run_pre_install(ctx, &spec.pre_install_commands)?;
        self.install_all(ctx, &spec.requirements)?;
        let snapshot = self.snapshot(ctx)?;
        debug!("dependency snapshot written to {}", snapshot.display());
        let relocated = self.relocate(ctx)?;
        debug!("dependencies relocated to {}", relocated.display());
        Ok(())
    }
}

pub fn select_installer(family: RuntimeFamily, tools: &Toolchain) -> Box<dyn RuntimeInstaller> {
    match family {
        RuntimeFamily::Python => Box::new(crate::python::PythonInstaller::new(
            &tools.python,
            &tools.shell,
        )),
        RuntimeFamily::Node => Box::new(crate::node::NodeInstaller::new(
            &tools.node,
            &tools.npm,
            &tools.shell,
        )),
    }
}

/// Move `from` to `to`, failing if the installer did not produce `from`.
pub(crate) fn move_dir(from: &Path, to: &Path) -> Result<PathBuf, RuntimeError> {
    if !from.is_dir() {
        return Err(RuntimeError::MissingOutput(from.display().to_string()));
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(from, to)?;
    Ok(to.to_path_buf())
}

/// Prepend `dir` to the inherited `PATH`.
pub(crate) fn path_with(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_owned())
}
