//! Resolver configuration.

use serde::{Deserialize, Serialize};

use crate::follow::{FollowConfig, FollowDirective};
use crate::{Error, Result};

/// Settings for a [`crate::Resolver`].
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Directive used by `fetch_page` and `follow`.
    pub directive: FollowDirective,
    pub follow: FollowConfig,
    /// Run the validation pass after each resolution.
    pub validate: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            directive: FollowDirective::Shallow,
            follow: FollowConfig::default(),
            validate: true,
        }
    }
}

impl ResolverConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.follow.validate()
    }

    pub fn deep(mut self) -> Self {
        self.directive = FollowDirective::Deep;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.follow.max_depth = Some(max_depth);
        self
    }
}
