//! Configuration for the crypto core.
//!
//! Every section has working defaults, so an empty JSON object is a complete
//! configuration. Values are checked once, when the services are built.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::{PasswordHashingConfig, TokenPolicy};
use crate::error::{CryptoError, CryptoResult};
use crate::key_management::RotationPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub rotation: RotationPolicy,
    pub password: PasswordHashingConfig,
    pub tokens: TokenPolicy,
}

impl CoreConfig {
    /// Preset for constrained devices: cheaper password hashing, default
    /// rotation and token lifetimes
    pub fn low_resource() -> Self {
        Self {
            password: PasswordHashingConfig::low_resource(),
            ..Self::default()
        }
    }

    /// Preset for sensitive deployments: 30-day rotation and stronger
    /// password hashing
    pub fn high_security() -> Self {
        Self {
            rotation: RotationPolicy::high_security(),
            password: PasswordHashingConfig::high_security(),
            tokens: TokenPolicy::default(),
        }
    }

    pub fn from_json_str(json: &str) -> CryptoResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CryptoError::configuration("config", &format!("invalid JSON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            CryptoError::configuration(
                "config",
                &format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        log::debug!("loading configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> CryptoResult<()> {
        self.rotation.validate()?;
        self.password.validate()?;
        self.tokens.validate()
    }
}
