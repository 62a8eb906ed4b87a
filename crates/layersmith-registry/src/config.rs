use serde::{Deserialize, Serialize};

/// How to reach the registry. Region and profile fall back to the CLI's
/// own configuration when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherConfig {
    pub program: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_owned(),
            region: None,
            profile: None,
        }
    }
}

impl PublisherConfig {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_owned());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_owned());
        self
    }
}
