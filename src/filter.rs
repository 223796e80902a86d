//! The kernel side packet filter of a raw HCI socket

const FLT_TYPE_BITS: u8 = 31;
const FLT_EVENT_BITS: u8 = 63;
const VENDOR_PKT: u8 = 0xFF;

/// Filter for the packets a raw HCI socket receives
///
/// This has the same layout as `struct hci_filter` of the Linux kernel so it can be passed
/// as-is to `getsockopt`/`setsockopt` with the option `HCI_FILTER`. A packet passes the filter
/// when the bit of its packet indicator is set in `type_mask` and, for events, the bit of its
/// event code is set within `event_mask`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HciFilter {
    pub type_mask: u32,
    pub event_mask: [u32; 2],
    pub opcode: u16,
}

fn packet_type_bit(packet_type: u8) -> u8 {
    if packet_type == VENDOR_PKT {
        0
    } else {
        packet_type & FLT_TYPE_BITS
    }
}

impl HciFilter {
    /// Create a filter that passes nothing
    pub fn new() -> Self {
        HciFilter::default()
    }

    pub fn clear(&mut self) {
        *self = HciFilter::default();
    }

    pub fn set_packet_type(&mut self, packet_type: u8) {
        self.type_mask |= 1 << packet_type_bit(packet_type);
    }

    pub fn has_packet_type(&self, packet_type: u8) -> bool {
        self.type_mask & (1 << packet_type_bit(packet_type)) != 0
    }

    pub fn set_event(&mut self, event_code: u8) {
        let bit = event_code & FLT_EVENT_BITS;

        self.event_mask[usize::from(bit >> 5)] |= 1 << (bit & 31);
    }

    pub fn has_event(&self, event_code: u8) -> bool {
        let bit = event_code & FLT_EVENT_BITS;

        self.event_mask[usize::from(bit >> 5)] & (1 << (bit & 31)) != 0
    }

    pub fn set_all_events(&mut self) {
        self.event_mask = [!0; 2];
    }
}
