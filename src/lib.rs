//! A channel to the Host Controller Interface of a Bluetooth controller
//!
//! This is the platform independent part of a raw HCI channel. It knows how HCI events, ACL data
//! and HCI commands are laid out on the wire, how to turn the few events a Bluetooth LE host
//! cares about into a [`DecodedEvent`], and how to build the outbound command packets. The
//! operating system specific part (opening and binding the socket, the ioctls, the readiness
//! loop) is hidden behind the [`HciSocket`] trait and implemented by a base crate such as
//! `hci-channel-linux`.
//!
//! ```
//! use hci_channel::{DecodedEvent, EventSink};
//!
//! // A `Vec` is the simplest sink there is
//! let mut events: Vec<DecodedEvent> = Vec::new();
//!
//! events.event(DecodedEvent::ConnectionComplete { handle: 0x40 });
//!
//! assert_eq!(1, events.len());
//! ```

mod acl;
mod address;
mod channel;
mod command;
mod config;
mod event;
mod filter;
pub mod packet;

pub use acl::decode_acl;
pub use address::{AddressParseError, BluetoothDeviceAddress};
pub use channel::{CommandWriter, ConnectionInfo, HciChannel, HciSocket, LE_LINK};
pub use command::{ConnectionParameters, Opcode};
pub use config::ChannelConfig;
pub use event::{decode_event, DecodedEvent, EventSink, Events};
pub use filter::HciFilter;
