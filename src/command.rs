//! Outbound HCI commands and L2CAP signaling
//!
//! The HCI command *LE Connection Update* and the L2CAP signal *Connection Parameter Update
//! Request* carry the same connection parameters. Which one is sent depends on the role of this
//! device within the connection, but both are built from the same [`ConnectionUpdateData`] so
//! they are always encoded the same way.

use crate::packet::{AclHeader, L2capHeader, COMMAND_HDR_SIZE, L2CAP_HDR_SIZE, SIGNALING_CHANNEL_ID};

/// An HCI command opcode
///
/// The opcode is made of a 6 bit group field (OGF) and a 10 bit command field (OCF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode {
    pub group: u16,
    pub field: u16,
}

impl Opcode {
    /// *LE Connection Update* (Vol 4, Part E, 7.8.18)
    pub const LE_CONNECTION_UPDATE: Opcode = Opcode::new(0x08, 0x0013);

    pub const fn new(group: u16, field: u16) -> Self {
        Opcode { group, field }
    }

    /// Pack into the 16 bit value sent over the interface
    pub const fn to_raw(self) -> u16 {
        (self.field & 0x03FF) | ((self.group & 0x3F) << 10)
    }

    pub const fn from_raw(raw: u16) -> Self {
        Opcode {
            group: raw >> 10,
            field: raw & 0x03FF,
        }
    }
}

/// Build the command header for a command with a parameter of length `parameter_len`
pub(crate) fn command_header(opcode: Opcode, parameter_len: u8) -> [u8; COMMAND_HDR_SIZE] {
    let [op_lo, op_hi] = opcode.to_raw().to_le_bytes();

    [op_lo, op_hi, parameter_len]
}

/// Parameters of a LE connection
///
/// The intervals and the supervision timeout are in milliseconds, the latency is the number of
/// connection events the peripheral may skip.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionParameters {
    pub min_interval: f64,
    pub max_interval: f64,
    pub latency: u16,
    pub supervision_timeout: u32,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        ConnectionParameters {
            min_interval: 7.5,
            max_interval: 4000.0,
            latency: 0,
            supervision_timeout: 32000,
        }
    }
}

const MIN_INTERVAL_MS: f64 = 7.5;
const MAX_INTERVAL_MS: f64 = 4000.0;
const INTERVAL_UNIT_MS: f64 = 1.25;
const MAX_LATENCY: u16 = 499;
const MIN_TIMEOUT_MS: u32 = 100;
const MAX_TIMEOUT_MS: u32 = 32000;
const TIMEOUT_UNIT_MS: u32 = 10;

/// Convert an interval into units of 1.25ms, forcing it into the valid range first
fn interval_units(interval: f64) -> u16 {
    // `f64::max` returns the other operand when `interval` is NaN
    (interval.max(MIN_INTERVAL_MS).min(MAX_INTERVAL_MS) / INTERVAL_UNIT_MS) as u16
}

fn timeout_units(timeout: u32) -> u16 {
    (timeout.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS) / TIMEOUT_UNIT_MS) as u16
}

/// Clamped connection parameters in controller units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionUpdateData {
    pub handle: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

impl ConnectionUpdateData {
    /// Size of the L2CAP signal data (the intervals, latency, and timeout)
    pub const SIGNAL_DATA_LEN: usize = 8;

    /// Size of the parameter of the HCI command
    pub const COMMAND_PARAMETER_LEN: usize = 14;

    pub fn new(handle: u16, parameters: &ConnectionParameters) -> Self {
        ConnectionUpdateData {
            handle,
            min_interval: interval_units(parameters.min_interval),
            max_interval: interval_units(parameters.max_interval),
            latency: parameters.latency.min(MAX_LATENCY),
            timeout: timeout_units(parameters.supervision_timeout),
            min_ce_length: 0x0001,
            max_ce_length: 0xFFFF,
        }
    }

    fn signal_fields(&self) -> [u16; 4] {
        [self.min_interval, self.max_interval, self.latency, self.timeout]
    }

    /// The parameter of the HCI command *LE Connection Update*
    pub fn command_parameter(&self) -> [u8; Self::COMMAND_PARAMETER_LEN] {
        let mut raw = [0u8; Self::COMMAND_PARAMETER_LEN];

        let fields = core::iter::once(self.handle)
            .chain(self.signal_fields())
            .chain([self.min_ce_length, self.max_ce_length]);

        for (chunk, field) in raw.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }

        raw
    }

    /// The data of the L2CAP *Connection Parameter Update Request* signal
    pub fn signal_data(&self) -> [u8; Self::SIGNAL_DATA_LEN] {
        let mut raw = [0u8; Self::SIGNAL_DATA_LEN];

        for (chunk, field) in raw.chunks_exact_mut(2).zip(self.signal_fields()) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }

        raw
    }
}

/// Code of the L2CAP signal *Connection Parameter Update Request* (Vol 3, Part A, 4.20)
pub(crate) const CONNECTION_PARAMETER_UPDATE_REQUEST: u8 = 0x12;

/// Size of a L2CAP signaling command header (code, identifier, and length)
pub(crate) const SIGNAL_HDR_SIZE: usize = 4;

/// The headers in front of the signal data of a *Connection Parameter Update Request*
pub(crate) struct ParameterUpdateRequestHeaders {
    pub acl: [u8; 4],
    pub l2cap: [u8; L2CAP_HDR_SIZE],
    pub signal: [u8; SIGNAL_HDR_SIZE],
}

impl ParameterUpdateRequestHeaders {
    pub fn new(handle: u16, identifier: u8) -> Self {
        let signal_len = ConnectionUpdateData::SIGNAL_DATA_LEN as u16;

        let l2cap = L2capHeader {
            length: SIGNAL_HDR_SIZE as u16 + signal_len,
            channel_id: SIGNALING_CHANNEL_ID,
        };

        let acl = AclHeader {
            handle,
            packet_boundary: 0,
            broadcast: 0,
            data_len: L2CAP_HDR_SIZE as u16 + l2cap.length,
        };

        let [len_lo, len_hi] = signal_len.to_le_bytes();

        ParameterUpdateRequestHeaders {
            acl: acl.to_bytes(),
            l2cap: l2cap.to_bytes(),
            signal: [CONNECTION_PARAMETER_UPDATE_REQUEST, identifier, len_lo, len_hi],
        }
    }
}
