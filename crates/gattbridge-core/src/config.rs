//! Persisted bridge configuration
//!
//! Configuration is layered with figment: defaults, then the TOML config
//! file, then `GATTBRIDGE_*` environment variables. The saved peripheral
//! identity is written back exactly once per successful target
//! confirmation; an empty name or MAC means "no auto-reconnect target".

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;

/// Default TCP listen port for the bridge
pub const DEFAULT_PORT: u16 = 9000;

// ----------------------------------------------------------------------------
// Bridge Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Saved peripheral name (empty when no device has been confirmed yet)
    pub ble_name: String,
    /// Saved peripheral MAC, six colon-separated hex bytes
    pub ble_mac: String,
    /// Listen address for the TCP server
    pub bind_address: String,
    /// Listen port for the TCP server
    pub port: u16,
    /// Start without a visible window; persisted for GUI shells, unused by
    /// the CLI host
    pub start_minimized: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ble_name: String::new(),
            ble_mac: String::new(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            start_minimized: false,
        }
    }
}

impl BridgeConfig {
    /// Default config file location: `<config dir>/gattbridge/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gattbridge")
            .join("config.toml")
    }

    /// Load configuration: defaults, then the TOML file if present, then
    /// `GATTBRIDGE_*` environment variables
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GATTBRIDGE_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Load configuration, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load configuration from {:?}: {}", path, e);
            Self::default()
        })
    }

    /// Persist the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Whether a confirmed peripheral identity has been saved
    pub fn has_saved_device(&self) -> bool {
        !self.ble_name.is_empty() && !self.ble_mac.is_empty()
    }

    /// Record a confirmed peripheral identity
    pub fn set_saved_device(&mut self, name: &str, mac: &str) {
        self.ble_name = name.to_string();
        self.ble_mac = mac.to_string();
    }
}
