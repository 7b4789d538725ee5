//! Engine Configuration

use serde::Deserialize;

use crate::error::{DddiError, Result};

fn default_digest_ttl() -> usize {
    10
}

/// Tunables for an engine session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of digest passes before giving up on an unstable model.
    #[serde(default = "default_digest_ttl")]
    pub digest_ttl: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            digest_ttl: default_digest_ttl(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DddiError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.digest_ttl == 0 {
            return Err(DddiError::InvalidConfig(
                "digest_ttl must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
