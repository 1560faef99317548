//! Error types shared across the bridge
//!
//! Individual client and peripheral failures are absorbed locally (the
//! bridge runs indefinitely); these types exist for the few places that do
//! propagate, such as frame encoding and configuration loading.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors from the TCP wire frame codec
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Payload too large for frame: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors from loading or persisting the bridge configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Load(String),

    #[error("Failed to write configuration: {0}")]
    Save(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ----------------------------------------------------------------------------
// Umbrella Error
// ----------------------------------------------------------------------------

/// Top-level error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Characteristic not ready: {role}")]
    CharacteristicNotReady { role: &'static str },

    #[error("BLE operation failed: {reason}")]
    Ble { reason: String },
}

impl BridgeError {
    /// Create a BLE operation error with a reason
    pub fn ble<T: Into<String>>(reason: T) -> Self {
        BridgeError::Ble {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
