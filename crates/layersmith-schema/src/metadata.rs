//! The `layer.yaml` document embedded at the payload root of every archive.
//!
//! The document is a single-entry map keyed by layer name, so a layer's
//! configuration can be read back without knowing the name in advance.

use crate::spec::LayerSpec;
use crate::SchemaError;
use std::collections::BTreeMap;

pub const METADATA_FILE_NAME: &str = "layer.yaml";

pub fn render_metadata(spec: &LayerSpec) -> Result<String, SchemaError> {
    let mut doc = BTreeMap::new();
    doc.insert(spec.name.as_str(), spec);
    Ok(serde_yaml::to_string(&doc)?)
}

pub fn parse_metadata(input: &str) -> Result<LayerSpec, SchemaError> {
    let doc: BTreeMap<String, LayerSpec> = serde_yaml::from_str(input)?;
    if doc.len() != 1 {
        return Err(SchemaError::InvalidMetadata(format!(
            "expected exactly one layer, found {}",
            doc.len()
        )));
    }
    let (name, mut spec) = doc
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::InvalidMetadata("empty document".to_owned()))?;
    spec.name = name;
    Ok(spec)
}
