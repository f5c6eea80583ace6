//! Configuration management for the NGAC policy machine
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (NGAC_* prefix, highest precedence)
//! 2. ngac.local.toml (gitignored, local overrides)
//! 3. ngac.toml (git-tracked, project config)
//! 4. ~/.config/ngac/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main policy machine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NgacConfig {
    pub machine: MachineConfig,
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Fixed machine uuid. A fresh one is generated when unset.
    pub uuid: Option<String>,
    pub name: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            name: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Accept assignments that close a cycle in the assignment graph.
    pub tolerate_cycles: bool,
    /// Use an adapter's native privilege queries when it advertises them.
    pub prefer_adapter_fast_paths: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerate_cycles: true,
            prefer_adapter_fast_paths: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Memory,
}

impl NgacConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a configuration from a TOML document, filling gaps with defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|source| ConfigError::ParseError { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as a TOML document
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Configuration that rejects cycle-creating assignments
    pub fn strict() -> Self {
        Self {
            engine: EngineConfig {
                tolerate_cycles: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check invariants the type system cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(uuid) = &self.machine.uuid
            && uuid.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "machine.uuid must not be empty when set".to_string(),
            ));
        }
        if self.machine.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "machine.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
