//! ENGINE CONFIGURATION
//!
//! Tunables for the allocation engine. Defaults reproduce the protocol
//! constants; deployments may override them from a config file and from
//! `STAKEPOOL__<SECTION>__<KEY>` environment variables.

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Upper bound on greedy pairing steps in a single rebalance pass.
pub const DEFAULT_MAX_REBALANCE_ITERATIONS: u32 = 20;
/// At most `(total − locked) / 2` may move per pass.
pub const DEFAULT_UNLOCKED_DIVISOR: u32 = 2;
/// At most `total / 7` may move per pass.
pub const DEFAULT_TOTAL_DIVISOR: u32 = 7;

const ENV_PREFIX: &str = "STAKEPOOL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceParams {
    pub max_iterations: u32,
    pub unlocked_divisor: u32,
    pub total_divisor: u32,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        RebalanceParams {
            max_iterations: DEFAULT_MAX_REBALANCE_ITERATIONS,
            unlocked_divisor: DEFAULT_UNLOCKED_DIVISOR,
            total_divisor: DEFAULT_TOTAL_DIVISOR,
        }
    }
}

impl RebalanceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter("rebalance.max_iterations must be non-zero".into()));
        }
        if self.unlocked_divisor == 0 {
            return Err(ConfigError::InvalidParameter("rebalance.unlocked_divisor must be non-zero".into()));
        }
        if self.total_divisor == 0 {
            return Err(ConfigError::InvalidParameter("rebalance.total_divisor must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rebalance: RebalanceParams,
}

impl EngineConfig {
    /// Layer an optional config file and the environment over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        Self::finish(settings)
    }

    /// Parse a TOML document, falling back to defaults for missing keys.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        Self::finish(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rebalance.validate()
    }

    fn finish(settings: Config) -> Result<Self, ConfigError> {
        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Configuration source error: {0}")]
    Source(String),
}
