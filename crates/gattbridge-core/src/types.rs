//! Shared bridge types: peripheral identity, characteristic roles, and
//! connection state

use std::fmt;

// ----------------------------------------------------------------------------
// Peripheral Identity
// ----------------------------------------------------------------------------

/// Name and address of the bridged peripheral, captured at connect time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    pub name: String,
    /// Six colon-separated uppercase hex bytes, e.g. `AA:BB:CC:DD:EE:FF`
    pub mac: String,
}

impl PeripheralIdentity {
    pub fn new(name: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: mac.into(),
        }
    }

    /// Format a 48-bit address as six colon-separated hex bytes
    pub fn format_mac(bytes: [u8; 6]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.mac)
    }
}

// ----------------------------------------------------------------------------
// Characteristic Roles
// ----------------------------------------------------------------------------

/// The three fixed logical endpoints the bridge requires on the peripheral,
/// identified by the low 16 bits of the 128-bit characteristic UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CharacteristicRole {
    /// Bulk data channel (0x7341)
    Data = 0x7341,
    /// Command channel (0x7343)
    Command = 0x7343,
    /// Notification channel (0x7344)
    Notify = 0x7344,
}

impl CharacteristicRole {
    /// Classify a 16-bit short identifier, returning None for anything that
    /// is not one of the three target roles
    pub fn from_short_id(short_id: u16) -> Option<Self> {
        match short_id {
            0x7341 => Some(Self::Data),
            0x7343 => Some(Self::Command),
            0x7344 => Some(Self::Notify),
            _ => None,
        }
    }

    pub fn short_id(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Command => "command",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name(), self.short_id())
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of the single peripheral session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    /// All three role characteristics are bound
    Confirmed,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::DiscoveringServices | Self::DiscoveringCharacteristics | Self::Confirmed
        )
    }
}

// ----------------------------------------------------------------------------
// BLE Status Snapshot
// ----------------------------------------------------------------------------

/// Point-in-time answer to a QueryBleStatus request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BleStatusInfo {
    pub connected: bool,
    pub name: String,
    pub mac: String,
    /// All three target roles (0x7341, 0x7343, 0x7344) are bound
    pub is_target: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_classification() {
        assert_eq!(
            CharacteristicRole::from_short_id(0x7341),
            Some(CharacteristicRole::Data)
        );
        assert_eq!(
            CharacteristicRole::from_short_id(0x7343),
            Some(CharacteristicRole::Command)
        );
        assert_eq!(
            CharacteristicRole::from_short_id(0x7344),
            Some(CharacteristicRole::Notify)
        );
        assert_eq!(CharacteristicRole::from_short_id(0x7342), None);
        assert_eq!(CharacteristicRole::from_short_id(0x2A00), None);
    }

    #[test]
    fn test_mac_formatting() {
        let mac = PeripheralIdentity::format_mac([0xAA, 0x0B, 0xCC, 0x01, 0xEE, 0xFF]);
        assert_eq!(mac, "AA:0B:CC:01:EE:FF");
    }

    #[test]
    fn test_connection_state_connected() {
        assert!(ConnectionState::Confirmed.is_connected());
        assert!(ConnectionState::DiscoveringServices.is_connected());
        assert!(!ConnectionState::Idle.is_connected());
        assert!(!ConnectionState::Scanning.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }
}
