//! Core protocol types for the gattbridge BLE-to-TCP bridge
//!
//! This crate holds everything that is shared between the BLE side and the
//! TCP side of the bridge and does no I/O of its own:
//!
//! - [`packet`] - TCP wire frame encoding and decoding
//! - [`status`] - device telemetry payloads and the sentinel sub-protocol
//! - [`cache`] - the last-known device status snapshot
//! - [`types`] - peripheral identity, characteristic roles, connection state
//! - [`config`] - persisted bridge configuration
//! - [`control`] - the router-facing peripheral seam
//! - [`errors`] - shared error types

pub mod cache;
pub mod config;
pub mod control;
pub mod errors;
pub mod packet;
pub mod status;
pub mod types;

pub use cache::StatusCache;
pub use config::BridgeConfig;
pub use control::PeripheralControl;
pub use errors::{BridgeError, CodecError, Result};
pub use packet::{encode_frame, FrameHeader, PacketType, MAX_PAYLOAD_LEN};
pub use status::{DeviceStatus, DEVICE_STATUS_QUERY};
pub use types::{BleStatusInfo, CharacteristicRole, ConnectionState, PeripheralIdentity};

/// Maximum number of bytes per write to the data-role characteristic.
pub const DATA_CHUNK_SIZE: usize = 200;

/// Maximum number of bytes per write to the command-role characteristic.
pub const COMMAND_CHUNK_SIZE: usize = 20;
