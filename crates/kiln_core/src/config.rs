//! # Registry Configuration
//!
//! Loaded once at startup, from TOML:
//!
//! ```toml
//! pool_capacity = 1024
//! queue_capacity = 256
//! callbacks = false
//! ```
//!
//! Missing keys take their defaults. Unknown keys are rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Tuning knobs for a registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Slots reserved up front in each pool of every archetype.
    pub pool_capacity: usize,
    /// Reserved length of the transition queue.
    pub queue_capacity: usize,
    /// Whether built-in events are delivered.
    pub callbacks: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 64,
            queue_capacity: 64,
            callbacks: true,
        }
    }
}

impl RegistryConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> EcsResult<String> {
        toml::to_string(self).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }
}
