use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::definitions::EngagementMethod;

/// Settings of a presentment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub engagement: EngagementMethod,
    /// Upper bound on a single key store signing operation.
    pub signing_timeout_ms: u64,
    /// Progress message reported when the reader connects.
    pub connected_message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to parse session config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("signing timeout must be greater than zero")]
    ZeroSigningTimeout,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engagement: EngagementMethod::QrCode,
            signing_timeout_ms: 30_000,
            connected_message: "Connected".to_string(),
        }
    }
}

impl SessionConfig {
    /// Loads a config from JSON, filling in defaults for missing fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_timeout_ms == 0 {
            return Err(ConfigError::ZeroSigningTimeout);
        }
        Ok(())
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_millis(self.signing_timeout_ms)
    }
}
