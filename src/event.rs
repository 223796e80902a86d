//! HCI event decoding
//!
//! Only the handful of events needed by a LE host are decoded, everything else is consumed
//! without producing anything. A packet is either decoded whole or dropped, there is never a
//! partial decode.

use crate::command::ConnectionParameters;
use crate::packet::{read_le16, EventHeader, EVENT_HDR_SIZE};
use crate::BluetoothDeviceAddress;

/// Events that can be monitored on a HCI channel
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Events {
    EncryptChange,
    CommandComplete,
    LeMeta,
}

impl Events {
    pub const fn code(self) -> u8 {
        match self {
            Events::EncryptChange => 0x08,
            Events::CommandComplete => 0x0E,
            Events::LeMeta => 0x3E,
        }
    }

    pub fn try_from_code(code: u8) -> Option<Self> {
        match code {
            0x08 => Some(Events::EncryptChange),
            0x0E => Some(Events::CommandComplete),
            0x3E => Some(Events::LeMeta),
            _ => None,
        }
    }
}

/// LE meta sub event *LE Connection Complete*
const LE_CONNECTION_COMPLETE: u8 = 0x01;

/// LE meta sub event *LE Connection Update Complete*
const LE_CONNECTION_UPDATE_COMPLETE: u8 = 0x03;

/// The result of decoding a packet received from the controller
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Encryption was turned on or off for the connection to `address`
    EncryptionChanged { address: BluetoothDeviceAddress, success: bool },
    /// A command finished, `data` is the return parameter after the status
    CommandCompleted { opcode: u16, status: u8, data: Vec<u8> },
    ConnectionComplete { handle: u16 },
    ConnectionUpdate { handle: u16, parameters: ConnectionParameters },
    /// A signature resolving key (CSRK) was sent over the Security Manager channel
    ///
    /// `remote` is true when the key is from the peer device.
    SignatureKeyReceived { handle: u16, remote: bool, key: [u8; 16] },
}

/// The receiver of what a HCI channel decodes
///
/// Events are handed over synchronously from within the dispatch of the channel.
pub trait EventSink {
    fn event(&mut self, event: DecodedEvent);

    /// Called when reading from the socket failed with anything other than a transient error
    fn read_error(&mut self, _error: &std::io::Error) {}
}

impl EventSink for Vec<DecodedEvent> {
    fn event(&mut self, event: DecodedEvent) {
        self.push(event)
    }
}

#[cfg(feature = "tokio")]
impl EventSink for tokio::sync::mpsc::UnboundedSender<DecodedEvent> {
    fn event(&mut self, event: DecodedEvent) {
        if self.send(event).is_err() {
            log::debug!("Dropping event, the receiver was dropped");
        }
    }
}

/// Decode a HCI event packet
///
/// `data` is the event packet without the packet indicator. The function `resolve` is used to
/// get the address of the peer for a connection handle. `None` is returned for anything that is
/// malformed, not supported, or not meant to produce an event.
pub fn decode_event<F>(data: &[u8], resolve: F) -> Option<DecodedEvent>
where
    F: FnOnce(u16) -> Option<BluetoothDeviceAddress>,
{
    let header = match EventHeader::from_bytes(data) {
        Some(header) => header,
        None => {
            log::warn!("Ignoring event packet of size {}", data.len());
            return None;
        }
    };

    let parameter = &data[EVENT_HDR_SIZE..];

    if usize::from(header.parameter_len) != parameter.len() {
        log::warn!(
            "Ignoring event packet, parameter length {} does not match the remaining size {}",
            header.parameter_len,
            parameter.len()
        );
        return None;
    }

    match Events::try_from_code(header.event_code)? {
        Events::EncryptChange => encryption_change(parameter, resolve),
        Events::CommandComplete => command_complete(parameter),
        Events::LeMeta => le_meta(parameter),
    }
}

fn encryption_change<F>(parameter: &[u8], resolve: F) -> Option<DecodedEvent>
where
    F: FnOnce(u16) -> Option<BluetoothDeviceAddress>,
{
    // status, handle, encryption enabled
    const LEN: usize = 4;

    if parameter.len() < LEN {
        log::warn!("Ignoring encryption change event of size {}", parameter.len());
        return None;
    }

    let status = parameter[0];
    let handle = read_le16(parameter, 1)?;

    let address = resolve(handle).filter(|address| !address.is_any())?;

    Some(DecodedEvent::EncryptionChanged {
        address,
        success: status == 0,
    })
}

fn command_complete(parameter: &[u8]) -> Option<DecodedEvent> {
    // number of packets, opcode, status
    const LEN: usize = 4;

    if parameter.len() < LEN {
        log::warn!("Ignoring command complete event of size {}", parameter.len());
        return None;
    }

    Some(DecodedEvent::CommandCompleted {
        opcode: read_le16(parameter, 1)?,
        status: parameter[3],
        data: parameter[LEN..].to_vec(),
    })
}

/// Decode a LE meta event (Vol 4, Part E, 7.7.65)
fn le_meta(parameter: &[u8]) -> Option<DecodedEvent> {
    match *parameter.first()? {
        LE_CONNECTION_COMPLETE => {
            // The status at offset 1 is not checked
            let handle = read_le16(parameter, 2);

            if handle.is_none() {
                log::warn!("Ignoring LE connection complete event of size {}", parameter.len());
            }

            Some(DecodedEvent::ConnectionComplete { handle: handle? })
        }
        LE_CONNECTION_UPDATE_COMPLETE => {
            // sub event code, status, handle, interval, latency, timeout
            const LEN: usize = 10;

            if parameter.len() < LEN {
                log::warn!("Ignoring LE connection update event of size {}", parameter.len());
                return None;
            }

            if parameter[1] != 0 {
                return None;
            }

            let handle = read_le16(parameter, 2)?;
            let interval = f64::from(read_le16(parameter, 4)?) * 1.25;

            let parameters = ConnectionParameters {
                min_interval: interval,
                max_interval: interval,
                latency: read_le16(parameter, 6)?,
                supervision_timeout: u32::from(read_le16(parameter, 8)?) * 10,
            };

            Some(DecodedEvent::ConnectionUpdate { handle, parameters })
        }
        _ => None,
    }
}
