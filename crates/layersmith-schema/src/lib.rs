//! Manifest parsing, layer specifications, runtime tags, and embedded layer metadata.
//!
//! This crate defines the schema layer: YAML manifest parsing (`Manifest`),
//! resolution of manifest entries into immutable `LayerSpec`s with merged
//! excludes, runtime tag parsing and family dispatch keys (`RuntimeTag`,
//! `RuntimeFamily`), and the `layer.yaml` metadata format embedded in every
//! produced archive.

pub mod manifest;
pub mod metadata;
pub mod runtime;
pub mod spec;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, LayerEntry, Manifest, RuntimeList,
    SUPPORTED_MANIFEST_VERSION,
};
pub use metadata::{parse_metadata, render_metadata, METADATA_FILE_NAME};
pub use runtime::{RuntimeFamily, RuntimeTag};
pub use spec::{default_description, validate_layer_name, LayerSpec};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("unsupported manifest version: {0}, expected {SUPPORTED_MANIFEST_VERSION}")]
    UnsupportedVersion(String),
    #[error("no layers found in manifest")]
    NoLayers,
    #[error("invalid layer name '{0}'")]
    InvalidLayerName(String),
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),
    #[error("no requirements found for layer '{0}'")]
    EmptyRequirements(String),
    #[error("no runtime specified for layer '{0}'")]
    MissingRuntime(String),
    #[error("unsupported runtime '{0}' (expected pythonX.Y or nodejsN.x)")]
    UnknownRuntime(String),
    #[error("malformed version in runtime tag '{0}'")]
    InvalidRuntimeVersion(String),
    #[error("invalid layer metadata: {0}")]
    InvalidMetadata(String),
}
