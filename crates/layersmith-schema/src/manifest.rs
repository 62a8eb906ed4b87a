use crate::spec::{default_description, validate_layer_name, LayerSpec};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const SUPPORTED_MANIFEST_VERSION: &str = "0.3";

/// On-disk shape of `layers.yaml`.
///
/// `layers` is kept as a raw mapping so declaration order survives parsing;
/// batch builds run in that order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    default_excludes: Vec<String>,
    #[serde(default)]
    layers: Mapping,
}

/// One entry under `layers:` exactly as written in the manifest.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerEntry {
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub runtimes: RuntimeList,
    #[serde(default)]
    pub pre_installs: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `runtimes` may be a single tag or a list. The first tag is the one the
/// layer is built against; all of them are advertised as compatible.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RuntimeList {
    One(String),
    Many(Vec<String>),
}

impl Default for RuntimeList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl RuntimeList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(tag) => tag.split_whitespace().map(str::to_owned).collect(),
            Self::Many(tags) => tags
                .iter()
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl LayerEntry {
    /// Produce the effective spec: the layer's own excludes followed by the
    /// global defaults. Duplicates are kept.
    pub fn resolve(&self, name: &str, default_excludes: &[String]) -> LayerSpec {
        let runtimes = self.runtimes.to_vec();
        let mut excludes = self.excludes.clone();
        excludes.extend(default_excludes.iter().cloned());

        LayerSpec {
            name: name.to_owned(),
            runtime: runtimes.first().cloned().unwrap_or_default(),
            compatible_runtimes: runtimes,
            requirements: self.requirements.clone(),
            excludes,
            pre_install_commands: self.pre_installs.clone(),
            description: self.description.clone().unwrap_or_else(default_description),
        }
    }
}

/// A parsed, version-checked manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: Option<String>,
    pub default_excludes: Vec<String>,
    pub layers: Vec<(String, LayerEntry)>,
}

impl Manifest {
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<LayerSpec> {
        self.layers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, entry)| entry.resolve(n, &self.default_excludes))
    }

    /// All layers in declaration order, resolved.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        self.layers
            .iter()
            .map(|(name, entry)| entry.resolve(name, &self.default_excludes))
            .collect()
    }

    /// Resolve the requested layers, or every layer when `names` is empty.
    ///
    /// Output follows manifest order regardless of request order.
    pub fn select(&self, names: &[String]) -> Result<Vec<LayerSpec>, SchemaError> {
        if names.is_empty() {
            return Ok(self.layer_specs());
        }
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.layers.iter().any(|(name, _)| name == *n))
        {
            return Err(SchemaError::UnknownLayer(unknown.clone()));
        }
        Ok(self
            .layers
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, entry)| entry.resolve(name, &self.default_excludes))
            .collect())
    }
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, SchemaError> {
    let raw: ManifestFile = serde_yaml::from_str(input)?;

    let version = raw.version.as_ref().and_then(version_string);
    match version.as_deref() {
        None => warn!("no version specified in manifest"),
        Some(SUPPORTED_MANIFEST_VERSION) => {}
        Some(other) => return Err(SchemaError::UnsupportedVersion(other.to_owned())),
    }

    if raw.layers.is_empty() {
        return Err(SchemaError::NoLayers);
    }

    let mut layers = Vec::with_capacity(raw.layers.len());
    for (key, value) in raw.layers {
        let name = match key {
            Value::String(s) => s,
            other => {
                return Err(SchemaError::InvalidLayerName(
                    serde_yaml::to_string(&other)
                        .unwrap_or_default()
                        .trim()
                        .to_owned(),
                ))
            }
        };
        validate_layer_name(&name)?;
        let entry = if value.is_null() {
            LayerEntry::default()
        } else {
            serde_yaml::from_value(value)?
        };
        layers.push((name, entry));
    }

    Ok(Manifest {
        version,
        default_excludes: raw.default_excludes,
        layers,
    })
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

/// Versions are usually quoted, but an unquoted `0.3` parses as a float.
fn version_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
