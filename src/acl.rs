//! ACL data decoding
//!
//! The only ACL data of interest is the *Signing Information* sent over the Security Manager
//! channel, as the kernel does not forward the CSRK of a peer any other way.

use crate::event::DecodedEvent;
use crate::packet::{read_le128, AclHeader, L2capHeader, ACL_HDR_SIZE, L2CAP_HDR_SIZE, SECURITY_CHANNEL_ID};

/// Security Manager command *Signing Information* (Vol 3, Part H, 3.6.6)
const SIGNING_INFORMATION: u8 = 0x0a;

/// Size of the *Signing Information* command (code and the 128 bit key)
const SIGNING_INFORMATION_LEN: usize = 17;

/// Packet boundary flag for the first fragment of a non-flushable packet
const PB_FIRST_NON_FLUSHABLE: u8 = 0;

/// Packet boundary flag for a complete L2CAP PDU (or the first fragment of a flushable one)
const PB_COMPLETE: u8 = 2;

/// Decode HCI ACL data
///
/// `data` is the ACL packet without the packet indicator. Only directed, complete (or first
/// fragment) packets are considered.
pub fn decode_acl(data: &[u8]) -> Option<DecodedEvent> {
    let header = match AclHeader::from_bytes(data) {
        Some(header) => header,
        None => {
            log::warn!("Ignoring unexpected ACL packet of size {}", data.len());
            return None;
        }
    };

    if (header.packet_boundary != PB_FIRST_NON_FLUSHABLE && header.packet_boundary != PB_COMPLETE)
        || header.broadcast != 0
    {
        return None;
    }

    let payload = &data[ACL_HDR_SIZE..];

    if usize::from(header.data_len) > payload.len() {
        log::warn!(
            "Received invalid ACL packet: data length {} exceeds packet size {}",
            header.data_len,
            payload.len()
        );
        return None;
    }

    let l2cap_header = match L2capHeader::from_bytes(payload) {
        Some(header) => header,
        None => {
            log::warn!("Received invalid ACL packet: too small for a L2CAP header");
            return None;
        }
    };

    let pdu = &payload[L2CAP_HDR_SIZE..];

    if usize::from(l2cap_header.length) > pdu.len() {
        log::warn!(
            "Received invalid ACL packet: L2CAP length {} exceeds packet size {}",
            l2cap_header.length,
            pdu.len()
        );
        return None;
    }

    if l2cap_header.channel_id != SECURITY_CHANNEL_ID {
        return None;
    }

    if pdu.first() != Some(&SIGNING_INFORMATION) {
        return None;
    }

    if pdu.len() != SIGNING_INFORMATION_LEN {
        log::warn!("Unexpected size {} of signing information", pdu.len());
        return None;
    }

    Some(DecodedEvent::SignatureKeyReceived {
        handle: header.handle,
        remote: header.packet_boundary == PB_COMPLETE,
        key: read_le128(pdu, 1)?,
    })
}
