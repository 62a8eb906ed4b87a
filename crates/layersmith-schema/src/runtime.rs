use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported runtime families. Adding a family means adding a variant here
/// and an installer for it in `layersmith-runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    Python,
    Node,
}

impl RuntimeFamily {
    pub const ALL: [RuntimeFamily; 2] = [RuntimeFamily::Python, RuntimeFamily::Node];

    /// Prefix of runtime tags belonging to this family.
    pub fn tag_prefix(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "nodejs",
        }
    }

    /// Top-level directory the execution environment expects inside a layer.
    pub fn payload_dir(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "nodejs",
        }
    }

    /// Name of the dependency snapshot written into the payload root.
    pub fn snapshot_file(self) -> &'static str {
        match self {
            Self::Python => "requirements.txt",
            Self::Node => "dependencies.txt",
        }
    }

    /// Resolve the family from a runtime tag by prefix match.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|family| tag.starts_with(family.tag_prefix()))
    }
}

impl fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => f.write_str("python"),
            Self::Node => f.write_str("node"),
        }
    }
}

/// A parsed runtime tag such as `python3.12` or `nodejs20.x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeTag {
    family: RuntimeFamily,
    version: String,
}

impl RuntimeTag {
    pub fn parse(tag: &str) -> Result<Self, SchemaError> {
        let tag = tag.trim();
        let family =
            RuntimeFamily::from_tag(tag).ok_or_else(|| SchemaError::UnknownRuntime(tag.to_owned()))?;
        let version = &tag[family.tag_prefix().len()..];

        let valid = match family {
            // major.minor, both numeric
            RuntimeFamily::Python => version
                .split_once('.')
                .is_some_and(|(major, minor)| is_numeric(major) && is_numeric(minor)),
            // major, optionally followed by ".x"
            RuntimeFamily::Node => {
                let major = version.strip_suffix(".x").unwrap_or(version);
                is_numeric(major)
            }
        };
        if !valid {
            return Err(SchemaError::InvalidRuntimeVersion(tag.to_owned()));
        }

        Ok(Self {
            family,
            version: version.to_owned(),
        })
    }

    /// Build the tag the local toolchain corresponds to.
    pub fn python(major: u32, minor: u32) -> Self {
        Self {
            family: RuntimeFamily::Python,
            version: format!("{major}.{minor}"),
        }
    }

    pub fn node(major: u32) -> Self {
        Self {
            family: RuntimeFamily::Node,
            version: format!("{major}.x"),
        }
    }

    pub fn family(&self) -> RuntimeFamily {
        self.family
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Major version component. Always numeric after parsing.
    pub fn major(&self) -> &str {
        self.version
            .split('.')
            .next()
            .unwrap_or(self.version.as_str())
    }

    /// Whether a locally detected toolchain satisfies this declared tag.
    ///
    /// Python must agree on major.minor; Node on the major version only.
    pub fn matches(&self, actual: &RuntimeTag) -> bool {
        if self.family != actual.family {
            return false;
        }
        match self.family {
            RuntimeFamily::Python => self.version == actual.version,
            RuntimeFamily::Node => self.major() == actual.major(),
        }
    }
}

impl fmt::Display for RuntimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family.tag_prefix(), self.version)
    }
}

impl FromStr for RuntimeTag {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
