use crate::runtime::RuntimeTag;
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Effective build configuration for one layer.
///
/// Produced by manifest resolution with the global default excludes already
/// merged into `excludes`. Never mutated afterwards; the same value is
/// embedded into the archive as `layer.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    /// Carried as the metadata map key rather than a field.
    #[serde(skip)]
    pub name: String,
    pub runtime: String,
    #[serde(default)]
    pub compatible_runtimes: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default, rename = "pre_installs")]
    pub pre_install_commands: Vec<String>,
    #[serde(default = "default_description")]
    pub description: String,
}

pub fn default_description() -> String {
    " ".to_owned()
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, runtime: impl Into<String>) -> Self {
        let runtime = runtime.into();
        Self {
            name: name.into(),
            compatible_runtimes: vec![runtime.clone()],
            runtime,
            requirements: Vec::new(),
            excludes: Vec::new(),
            pre_install_commands: Vec::new(),
            description: default_description(),
        }
    }

    #[must_use]
    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = excludes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_pre_installs<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_install_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Check everything that can be checked without touching the system.
    ///
    /// Returns the parsed runtime tag so callers dispatch on the same value
    /// that was validated.
    pub fn validate(&self) -> Result<RuntimeTag, SchemaError> {
        validate_layer_name(&self.name)?;
        if self.requirements.is_empty() {
            return Err(SchemaError::EmptyRequirements(self.name.clone()));
        }
        if self.runtime.trim().is_empty() {
            return Err(SchemaError::MissingRuntime(self.name.clone()));
        }
        RuntimeTag::parse(&self.runtime)
    }

    /// File name of the archive produced for this layer.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.name)
    }
}

/// Layer names become archive file names, so they must be a single path
/// component.
pub fn validate_layer_name(name: &str) -> Result<(), SchemaError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(SchemaError::InvalidLayerName(name.to_owned()));
    }
    Ok(())
}
