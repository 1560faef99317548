//! Device telemetry payloads and the sentinel sub-protocol
//!
//! The peripheral rides a small fixed-format sub-protocol inside ordinary
//! BLE notification payloads. A status telemetry frame is exactly 13 bytes:
//! `[0xAA][0xBB][0x00][8 status bytes][0xCC][0xDD]`. These frames update
//! the status snapshot cache and are never forwarded to TCP clients.

// ----------------------------------------------------------------------------
// Sentinel Constants
// ----------------------------------------------------------------------------

/// Sentinel prefix shared by all device command/telemetry frames
const SENTINEL_PREFIX: [u8; 2] = [0xAA, 0xBB];

/// Sentinel suffix shared by all device command/telemetry frames
const SENTINEL_SUFFIX: [u8; 2] = [0xCC, 0xDD];

/// Opcode of the status query / status telemetry frames
const OPCODE_STATUS: u8 = 0x00;

/// Total length of a status telemetry notification
const STATUS_NOTIFICATION_LEN: usize = 13;

/// Written to the command-role characteristic once per target confirmation
/// to ask the peripheral for a status telemetry notification.
pub const DEVICE_STATUS_QUERY: [u8; 5] = [0xAA, 0xBB, OPCODE_STATUS, 0xCC, 0xDD];

// ----------------------------------------------------------------------------
// Device Status
// ----------------------------------------------------------------------------

/// Last-known 8-field telemetry reading from the peripheral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub battery_level: u8,
    pub signal_strength: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub work_mode: u8,
    pub light_mode: u8,
    pub switch_state: u8,
    pub reserved: u8,
}

impl DeviceStatus {
    /// Serialize the 8 fields in declaration order, no length prefixes
    pub fn to_bytes(&self) -> [u8; 8] {
        [
            self.battery_level,
            self.signal_strength,
            self.firmware_major,
            self.firmware_minor,
            self.work_mode,
            self.light_mode,
            self.switch_state,
            self.reserved,
        ]
    }

    /// Parse 8 positional fields; short input yields zeroed fields
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.len() < 8 {
            return Self::default();
        }
        Self {
            battery_level: bytes[0],
            signal_strength: bytes[1],
            firmware_major: bytes[2],
            firmware_minor: bytes[3],
            work_mode: bytes[4],
            light_mode: bytes[5],
            switch_state: bytes[6],
            reserved: bytes[7],
        }
    }
}

// ----------------------------------------------------------------------------
// Notification Classification
// ----------------------------------------------------------------------------

/// Structural check for a status telemetry notification: exactly 13 bytes,
/// `AA BB 00` prefix, `CC DD` suffix
pub fn is_status_notification(payload: &[u8]) -> bool {
    payload.len() == STATUS_NOTIFICATION_LEN
        && payload[0] == SENTINEL_PREFIX[0]
        && payload[1] == SENTINEL_PREFIX[1]
        && payload[2] == OPCODE_STATUS
        && payload[11] == SENTINEL_SUFFIX[0]
        && payload[12] == SENTINEL_SUFFIX[1]
}

/// Parse the 8 status bytes out of a telemetry notification.
///
/// Callers must have classified the payload with [`is_status_notification`]
/// first; anything else yields a zeroed status.
pub fn parse_status_notification(payload: &[u8]) -> DeviceStatus {
    if !is_status_notification(payload) {
        return DeviceStatus::default();
    }
    DeviceStatus::parse(&payload[3..11])
}

/// Structural check for a client "state upload" command.
///
/// The device protocol frames every command as `AA BB <opcode> ... CC DD`;
/// opcode 0x00 is the status query. A state upload is any well-formed
/// sentinel frame with a non-zero opcode. The last such payload is cached
/// and replayed once per reconnect so the peripheral resumes its last
/// configured mode.
pub fn is_state_upload(payload: &[u8]) -> bool {
    payload.len() >= 5
        && payload[0] == SENTINEL_PREFIX[0]
        && payload[1] == SENTINEL_PREFIX[1]
        && payload[2] != OPCODE_STATUS
        && payload[payload.len() - 2] == SENTINEL_SUFFIX[0]
        && payload[payload.len() - 1] == SENTINEL_SUFFIX[1]
}
