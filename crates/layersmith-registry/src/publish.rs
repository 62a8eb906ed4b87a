use crate::config::PublisherConfig;
use crate::RegistryError;
use layersmith_runtime::exec::{self, ExecOptions};
use layersmith_schema::LayerSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Everything the registry needs to register one layer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub layer_name: String,
    pub description: String,
    pub archive: PathBuf,
    pub compatible_runtimes: Vec<String>,
}

impl PublishRequest {
    pub fn from_spec(spec: &LayerSpec, archive: &Path) -> Self {
        Self {
            layer_name: spec.name.clone(),
            description: spec.description.clone(),
            archive: archive.to_path_buf(),
            compatible_runtimes: spec.compatible_runtimes.clone(),
        }
    }
}

/// The registered layer version, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    #[serde(rename = "LayerArn", default)]
    pub layer_arn: String,
    #[serde(rename = "LayerVersionArn")]
    pub layer_version_arn: String,
    #[serde(rename = "Version")]
    pub version: u64,
    #[serde(rename = "CreatedDate", default)]
    pub created_date: Option<String>,
}

pub struct Publisher {
    config: PublisherConfig,
    exec: ExecOptions,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            exec: ExecOptions::default(),
        }
    }

    #[must_use]
    pub fn with_exec(mut self, exec: ExecOptions) -> Self {
        self.exec = exec;
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// The registry CLI invocation for `request`.
    pub fn build_command(&self, request: &PublishRequest) -> Command {
        let mut zip_file = std::ffi::OsString::from("fileb://");
        zip_file.push(request.archive.as_os_str());

        let mut cmd = Command::new(&self.config.program);
        cmd.args(["lambda", "publish-layer-version"])
            .arg("--layer-name")
            .arg(&request.layer_name)
            .arg("--description")
            .arg(&request.description)
            .arg("--zip-file")
            .arg(zip_file)
            .arg("--compatible-runtimes")
            .args(&request.compatible_runtimes)
            .args(["--output", "json"]);
        if let Some(region) = &self.config.region {
            cmd.arg("--region").arg(region);
        }
        if let Some(profile) = &self.config.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd
    }

    /// Register `request.archive` as a new version of the layer.
    ///
    /// The archive must already exist and be non-empty; nothing is sent
    /// otherwise.
    pub fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, RegistryError> {
        let meta = match std::fs::metadata(&request.archive) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::ArchiveMissing(request.archive.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.len() == 0 {
            return Err(RegistryError::EmptyArchive(request.archive.clone()));
        }
        if request.compatible_runtimes.is_empty() {
            return Err(RegistryError::NoCompatibleRuntimes(
                request.layer_name.clone(),
            ));
        }

        // `fileb://` paths are resolved by the registry CLI, not by us.
        let request = PublishRequest {
            archive: request.archive.canonicalize()?,
            ..request.clone()
        };
        info!(
            "publishing {} ({} bytes) as layer '{}'",
            request.archive.display(),
            meta.len(),
            request.layer_name
        );
        let mut cmd = self.build_command(&request);
        debug!("registry command: {}", exec::describe(&cmd));
        let output = exec::capture(&mut cmd, &self.exec)?;
        let outcome = parse_response(&String::from_utf8_lossy(&output.stdout))?;
        info!(
            "published {} version {}",
            request.layer_name, outcome.version
        );
        Ok(outcome)
    }
}

/// Parse the JSON document printed by `publish-layer-version`.
pub fn parse_response(stdout: &str) -> Result<PublishOutcome, RegistryError> {
    serde_json::from_str(stdout.trim())
        .map_err(|e| RegistryError::InvalidResponse(format!("{e}: {}", stdout.trim())))
}
