//! Lifecycle and data events emitted by the peripheral session
//!
//! Consumers receive these over an unbounded channel; there is no callback
//! registration that could go stale across reconnects.

use btleplug::platform::PeripheralId;
use gattbridge_core::PeripheralIdentity;

/// Events emitted by [`crate::PeripheralSession`]
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A scan result, including duplicates across stop/start cycles.
    /// Callers filter; the session does not dedup across restarts.
    PeripheralDiscovered {
        identity: PeripheralIdentity,
        id: PeripheralId,
    },

    /// A connection attempt succeeded; service discovery is starting
    Connected(PeripheralIdentity),

    /// The connection was torn down, by the peripheral or by an explicit
    /// disconnect
    Disconnected,

    /// All three role characteristics were found on this connection.
    /// Fires at most once per connection lifetime.
    TargetConfirmed(PeripheralIdentity),

    /// Characteristic discovery completed without all three roles bound;
    /// the host policy is expected to disconnect and resume scanning
    TargetNotFound,

    /// A value-changed notification from the notify-role characteristic
    Notification(Vec<u8>),
}
