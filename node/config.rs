//! Node configuration.
//!
//! A TOML file is layered under environment overrides: `VALSET_MIN_FEE=5`
//! sets `min_fee`, `VALSET_IDENTITY__POWER_UNIT=10` sets
//! `identity.power_unit`.

use ::config::{Config, Environment, File, FileFormat};
use protocol_identity::IdentityConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{NodeError, NodeResult};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "VALSET";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Validator set protocol parameters
    pub identity: IdentityConfig,

    /// State snapshot restored on startup and rewritten after each commit
    pub snapshot_path: Option<PathBuf>,

    /// Fallback tracing filter when `RUST_LOG` is not set
    pub log_filter: String,

    /// Smallest fee a transaction may carry
    pub min_fee: u64,
}

impl NodeConfig {
    pub fn new() -> Self {
        Self {
            identity: IdentityConfig::default(),
            snapshot_path: None,
            log_filter: "info".to_string(),
            min_fee: 0,
        }
    }

    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_min_fee(mut self, fee: u64) -> Self {
        self.min_fee = fee;
        self
    }

    /// Loads defaults, then `path` if given, then `VALSET_*` environment
    /// variables, and validates the result.
    pub fn load(path: Option<&Path>) -> NodeResult<Self> {
        let defaults = toml::to_string(&Self::default())?;
        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(?path, min_fee = config.min_fee, "node configuration loaded");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> NodeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> NodeResult<()> {
        self.identity.validate()?;
        if self.log_filter.trim().is_empty() {
            return Err(NodeError::Config(::config::ConfigError::Message(
                "log_filter must not be empty".to_string(),
            )));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
