//! TCP wire protocol framing
//!
//! Every message on the TCP side is `[Type:1][Length:2 LE][Payload:Length]`.
//! Framing is pure and stateless; reading frames off a socket lives in the
//! server crate.

use crate::errors::CodecError;
use crate::types::BleStatusInfo;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the frame header: type byte plus 16-bit little-endian length
pub const FRAME_HEADER_LEN: usize = 3;

/// Largest payload a frame can carry (length field is u16)
pub const MAX_PAYLOAD_LEN: usize = 65535;

// ----------------------------------------------------------------------------
// Packet Types
// ----------------------------------------------------------------------------

/// Frame types on the TCP wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Client → server: raw bytes for the data-role characteristic
    WriteData = 0x01,
    /// Client → server: raw bytes for the command-role characteristic
    WriteCommand = 0x02,
    /// Client → server: query BLE connection status (empty payload)
    QueryBleStatus = 0x03,
    /// Client → server: query cached device telemetry (empty payload)
    QueryDeviceInfo = 0x04,
    /// Server → client: raw BLE notification payload, unmodified
    BleNotify = 0x81,
    /// Server → client: BLE connection status response
    BleStatusResp = 0x82,
    /// Server → client: cached device telemetry response
    DeviceInfoResp = 0x83,
}

impl PacketType {
    /// Convert from the raw type byte, returning None for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::WriteData),
            0x02 => Some(Self::WriteCommand),
            0x03 => Some(Self::QueryBleStatus),
            0x04 => Some(Self::QueryDeviceInfo),
            0x81 => Some(Self::BleNotify),
            0x82 => Some(Self::BleStatusResp),
            0x83 => Some(Self::DeviceInfoResp),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame Codec
// ----------------------------------------------------------------------------

/// Parsed 3-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type byte; may not map to a known [`PacketType`]
    pub raw_type: u8,
    pub length: u16,
}

impl FrameHeader {
    /// Decode a frame header. Pure transform, never fails on 3 bytes.
    pub fn parse(bytes: &[u8; FRAME_HEADER_LEN]) -> Self {
        Self {
            raw_type: bytes[0],
            length: u16::from_le_bytes([bytes[1], bytes[2]]),
        }
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.raw_type)
    }
}

/// Encode a complete frame: header followed by the payload verbatim
pub fn encode_frame(packet_type: PacketType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(packet_type as u8);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Serialize a [`BleStatusInfo`] to its wire payload:
/// `[connected:1][nameLen:1][name:N][macLen:1][mac:M][isTarget:1]`
///
/// Variable fields are length-prefixed UTF-8 with no terminator. Names and
/// MACs longer than 255 bytes do not occur in practice; they are truncated
/// at the prefix limit rather than rejected.
pub fn build_ble_status_payload(info: &BleStatusInfo) -> Vec<u8> {
    let name = &info.name.as_bytes()[..info.name.len().min(255)];
    let mac = &info.mac.as_bytes()[..info.mac.len().min(255)];

    let mut payload = Vec::with_capacity(4 + name.len() + mac.len());
    payload.push(info.connected as u8);
    payload.push(name.len() as u8);
    payload.extend_from_slice(name);
    payload.push(mac.len() as u8);
    payload.extend_from_slice(mac);
    payload.push(info.is_target as u8);
    payload
}
