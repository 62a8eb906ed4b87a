use crate::exec::{self, ExecOptions};
use crate::installer::{move_dir, path_with, InstallContext, RuntimeInstaller};
use crate::RuntimeError;
use layersmith_schema::{RuntimeFamily, RuntimeTag};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

const PREFIX_DIR: &str = "node";

/// Installs requirements with npm into a private prefix inside the
/// workspace, then moves `node_modules/` under `nodejs/`.
pub struct NodeInstaller {
    node: String,
    npm: String,
    shell: String,
}

impl NodeInstaller {
    pub fn new(node: &str, npm: &str, shell: &str) -> Self {
        Self {
            node: node.to_owned(),
            npm: npm.to_owned(),
            shell: shell.to_owned(),
        }
    }

    fn prefix_dir(ctx: &InstallContext) -> PathBuf {
        ctx.workspace.join(PREFIX_DIR)
    }

    fn npm(&self, ctx: &InstallContext) -> Command {
        let mut cmd = Command::new(&self.npm);
        cmd.arg("--prefix")
            .arg(Self::prefix_dir(ctx))
            .current_dir(&ctx.workspace)
            .envs(self.environment(ctx))
            .env("npm_config_update_notifier", "false")
            .env("npm_config_fund", "false")
            .env("npm_config_audit", "false");
        if ctx.isolate_caches {
            cmd.env("npm_config_cache", ctx.cache_dir("npm"));
        }
        cmd
    }
}

impl RuntimeInstaller for NodeInstaller {
    fn family(&self) -> RuntimeFamily {
        RuntimeFamily::Node
    }

    fn shell(&self) -> &str {
        &self.shell
    }

    fn detect(&self, exec: &ExecOptions) -> Result<RuntimeTag, RuntimeError> {
        let output = exec::capture(Command::new(&self.node).arg("--version"), exec)?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        let major = parse_node_major(&text).ok_or_else(|| RuntimeError::UnrecognizedVersion {
            tool: self.node.clone(),
            output: text.trim().to_owned(),
        })?;
        Ok(RuntimeTag::node(major))
    }

    fn prepare_environment(&self, ctx: &InstallContext) -> Result<(), RuntimeError> {
        let prefix = Self::prefix_dir(ctx);
        info!("creating npm prefix at {}", prefix.display());
        std::fs::create_dir_all(&prefix)?;
        // Without a package.json npm walks up looking for one.
        let manifest = serde_json::json!({ "name": "layer", "private": true });
        std::fs::write(
            prefix.join("package.json"),
            serde_json::to_vec_pretty(&manifest).map_err(std::io::Error::other)?,
        )?;
        Ok(())
    }

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
            (
                "PATH".to_owned(),
                path_with(&Self::prefix_dir(ctx).join("node_modules").join(".bin")),
            ),
        ]
    }

    fn install_all(&self, ctx: &InstallContext, requirements: &[String]) -> Result<(), RuntimeError> {
        for requirement in requirements {
            info!("npm install {requirement}");
            exec::run(self.npm(ctx).arg("install").arg(requirement), &ctx.exec)?;
        }
        Ok(())
    }

    fn snapshot(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        let path = self.snapshot_path(ctx);
        exec::run_to_file(self.npm(ctx).args(["ls", "--all"]), &path, &ctx.exec)?;
        Ok(path)
    }

    fn relocate(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        move_dir(
            &Self::prefix_dir(ctx).join("node_modules"),
            &ctx.payload_root.join("node_modules"),
        )
    }
}

/// Extract the major version from `v20.11.1` style output.
pub fn parse_node_major(output: &str) -> Option<u32> {
    let trimmed = output.trim();
    let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
    version.split('.').next()?.parse().ok()
}
