//! Seam between the TCP router and the peripheral session
//!
//! The router only ever needs three things from the BLE side: write to the
//! data role, write to the command role, and snapshot the connection
//! status. Keeping this behind a trait keeps the router testable without
//! Bluetooth hardware.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::BleStatusInfo;

#[async_trait]
pub trait PeripheralControl: Send + Sync {
    /// One write to the data-role characteristic. Callers chunk payloads to
    /// the data MTU (see [`crate::DATA_CHUNK_SIZE`]). Fails with
    /// `CharacteristicNotReady` when the role is unbound.
    async fn write_data(&self, payload: &[u8]) -> Result<()>;

    /// One write to the command-role characteristic. Callers chunk to the
    /// command MTU (see [`crate::COMMAND_CHUNK_SIZE`]).
    async fn write_command(&self, payload: &[u8]) -> Result<()>;

    /// Point-in-time connection status for QueryBleStatus replies
    async fn ble_status(&self) -> BleStatusInfo;
}
