use crate::CoreError;
use layersmith_registry::PublisherConfig;
use layersmith_runtime::Toolchain;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "layersmith.toml";

/// Host programs used by a build. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub python: String,
    pub node: String,
    pub npm: String,
    pub strip: String,
    pub shell: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        let tc = Toolchain::default();
        Self {
            python: tc.python,
            node: tc.node,
            npm: tc.npm,
            strip: "strip".to_owned(),
            shell: tc.shell,
        }
    }
}

impl ToolConfig {
    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            python: self.python.clone(),
            node: self.node.clone(),
            npm: self.npm.clone(),
            shell: self.shell.clone(),
        }
    }
}

/// Settings from `layersmith.toml`. Every field is optional in the file.
///
/// ```toml
/// temp_root = "/var/tmp"
/// output_dir = "dist"
/// command_timeout_secs = 900
/// isolate_caches = false
/// lock_caches = true
///
/// [tools]
/// python = "python3.12"
/// strip = "llvm-strip"
///
/// [registry]
/// region = "eu-west-1"
/// profile = "deploy"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Parent directory for build workspaces and lock files.
    pub temp_root: PathBuf,
    /// Where archives are written. Defaults to the working directory.
    pub output_dir: Option<PathBuf>,
    /// Upper bound for any single external command.
    pub command_timeout_secs: Option<u64>,
    /// Keep pip/npm caches inside the workspace.
    pub isolate_caches: bool,
    /// Serialize builds of the same runtime family.
    pub lock_caches: bool,
    pub tools: ToolConfig,
    pub registry: PublisherConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            output_dir: None,
            command_timeout_secs: None,
            isolate_caches: false,
            lock_caches: true,
            tools: ToolConfig::default(),
            registry: PublisherConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `explicit` if given, else `layersmith.toml` in `dir` if present,
    /// else defaults. A relative `output_dir` is resolved against `dir`.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, CoreError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    debug!("using config {}", candidate.display());
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        if let Some(out) = &config.output_dir {
            if out.is_relative() {
                config.output_dir = Some(dir.join(out));
            }
        }
        Ok(config)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}
