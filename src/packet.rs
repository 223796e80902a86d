//! Wire layout of HCI packets
//!
//! Every packet that goes over a raw HCI socket starts with a one byte packet indicator (the same
//! indicator used by the UART transport) followed by the packet itself. All multi-byte fields are
//! little-endian and are read and written through the helpers within this module.

/// Packet indicator for a HCI command packet
pub const COMMAND_PKT: u8 = 0x01;

/// Packet indicator for ACL data
pub const ACL_PKT: u8 = 0x02;

/// Packet indicator for a HCI event packet
pub const EVENT_PKT: u8 = 0x04;

/// Size of the event header (event code and parameter length)
pub const EVENT_HDR_SIZE: usize = 2;

/// Size of the HCI ACL data header (packed handle/flags and data length)
pub const ACL_HDR_SIZE: usize = 4;

/// Size of a basic L2CAP header (length and channel identifier)
pub const L2CAP_HDR_SIZE: usize = 4;

/// Size of the HCI command header (opcode and parameter length)
pub const COMMAND_HDR_SIZE: usize = 3;

/// The largest event the controller can send (header plus 255 bytes of parameters)
pub const MAX_EVENT_SIZE: usize = 260;

/// Size of the buffer used for a single read from the socket
pub const MAX_PACKET_SIZE: usize = if MAX_EVENT_SIZE > ACL_HDR_SIZE {
    MAX_EVENT_SIZE
} else {
    ACL_HDR_SIZE
};

/// The fixed L2CAP channel for LE signaling
pub const SIGNALING_CHANNEL_ID: u16 = 0x0005;

/// The fixed L2CAP channel of the Security Manager
pub const SECURITY_CHANNEL_ID: u16 = 0x0006;

/// Packet indicator of a raw packet
///
/// Only commands, events, and ACL data are of interest to a HCI channel. Anything else (SCO,
/// ISO, vendor) is dropped by the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Command,
    AclData,
    Event,
}

impl core::convert::TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            COMMAND_PKT => Ok(PacketType::Command),
            ACL_PKT => Ok(PacketType::AclData),
            EVENT_PKT => Ok(PacketType::Event),
            _ => Err(raw),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(pt: PacketType) -> u8 {
        match pt {
            PacketType::Command => COMMAND_PKT,
            PacketType::AclData => ACL_PKT,
            PacketType::Event => EVENT_PKT,
        }
    }
}

/// Read a little-endian `u16` at `offset`
///
/// `None` is returned if the two bytes are not within `data`.
pub fn read_le16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;

    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a 128 bit little-endian value at `offset`
///
/// The bytes are returned in the order they were received.
pub fn read_le128(data: &[u8], offset: usize) -> Option<[u8; 16]> {
    let bytes = data.get(offset..offset.checked_add(16)?)?;

    let mut value = [0u8; 16];

    value.copy_from_slice(bytes);

    Some(value)
}

/// Header of a HCI event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub event_code: u8,
    pub parameter_len: u8,
}

impl EventHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [event_code, parameter_len, ..] => Some(EventHeader {
                event_code: *event_code,
                parameter_len: *parameter_len,
            }),
            _ => None,
        }
    }
}

/// Header of HCI ACL data
///
/// The connection handle is the lower 12 bits of the first field, the packet boundary flag and
/// the broadcast flag are the two upper 2 bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclHeader {
    pub handle: u16,
    pub packet_boundary: u8,
    pub broadcast: u8,
    pub data_len: u16,
}

impl AclHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let first = read_le16(data, 0)?;
        let data_len = read_le16(data, 2)?;

        Some(AclHeader {
            handle: first & 0x0FFF,
            packet_boundary: ((first >> 12) & 0x3) as u8,
            broadcast: ((first >> 14) & 0x3) as u8,
            data_len,
        })
    }

    pub fn to_bytes(&self) -> [u8; ACL_HDR_SIZE] {
        let first = (self.handle & 0x0FFF)
            | (u16::from(self.packet_boundary & 0x3) << 12)
            | (u16::from(self.broadcast & 0x3) << 14);

        let [b0, b1] = first.to_le_bytes();
        let [b2, b3] = self.data_len.to_le_bytes();

        [b0, b1, b2, b3]
    }
}

/// Basic L2CAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2capHeader {
    pub length: u16,
    pub channel_id: u16,
}

impl L2capHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(L2capHeader {
            length: read_le16(data, 0)?,
            channel_id: read_le16(data, 2)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; L2CAP_HDR_SIZE] {
        let [b0, b1] = self.length.to_le_bytes();
        let [b2, b3] = self.channel_id.to_le_bytes();

        [b0, b1, b2, b3]
    }
}
