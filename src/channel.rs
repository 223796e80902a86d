//! The HCI channel
//!
//! [`HciChannel`] holds the bound socket and the set of monitored events. It is driven from the
//! outside: whoever watches the socket for readiness calls [`on_readable`] and everything that is
//! decoded is handed to the [`EventSink`] before that call returns.
//!
//! [`on_readable`]: HciChannel::on_readable

use crate::command::{command_header, ConnectionUpdateData, ParameterUpdateRequestHeaders};
use crate::packet::{PacketType, ACL_PKT, COMMAND_PKT, EVENT_PKT, MAX_PACKET_SIZE};
use crate::{decode_acl, decode_event, BluetoothDeviceAddress, ChannelConfig, ConnectionParameters};
use crate::{EventSink, Events, HciFilter, Opcode};
use std::collections::BTreeSet;
use std::io::{self, ErrorKind, IoSlice};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Link type of a LE connection within the kernel's connection list
pub const LE_LINK: u8 = 0x80;

/// A connection listed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub handle: u16,
    pub address: BluetoothDeviceAddress,
    pub link_type: u8,
    pub outgoing: bool,
    pub state: u16,
    pub link_mode: u32,
}

/// A raw HCI socket bound to an adapter
///
/// This is the operating system specific part of a [`HciChannel`].
pub trait HciSocket {
    /// Read one packet (including its packet indicator)
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write one packet, made up of `buffers`, with a single vectored write
    fn write_vectored(&self, buffers: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Get the current packet filter of the socket
    fn filter(&self) -> io::Result<HciFilter>;

    fn set_filter(&self, filter: &HciFilter) -> io::Result<()>;

    /// Get the current connections of the adapter
    fn connections(&self) -> io::Result<Vec<ConnectionInfo>>;
}

fn is_transient(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Get the next signaling identifier (a signaling identifier is never zero)
fn next_signal_identifier(counter: &AtomicU8) -> u8 {
    let next = |identifier: u8| identifier.checked_add(1).unwrap_or(1);

    match counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |identifier| Some(next(identifier))) {
        Ok(previous) | Err(previous) => next(previous),
    }
}

/// Write a packet, retrying for as long as the write fails with `EAGAIN` or `EINTR`
fn write_packet<S: HciSocket>(socket: &S, buffers: &[IoSlice<'_>]) -> bool {
    loop {
        match socket.write_vectored(buffers) {
            Ok(_) => break true,
            Err(ref e) if is_transient(e) => continue,
            Err(e) => {
                log::warn!("Failure writing HCI packet: {}", e);
                break false;
            }
        }
    }
}

fn write_command<S: HciSocket>(socket: &S, opcode: Opcode, parameter: &[u8]) -> bool {
    let parameter_len = match u8::try_from(parameter.len()) {
        Ok(len) => len,
        Err(_) => {
            log::warn!("Parameter of command {:#06x} is too long", opcode.to_raw());
            return false;
        }
    };

    let indicator = [COMMAND_PKT];
    let header = command_header(opcode, parameter_len);

    if parameter.is_empty() {
        write_packet(socket, &[IoSlice::new(&indicator), IoSlice::new(&header)])
    } else {
        write_packet(
            socket,
            &[IoSlice::new(&indicator), IoSlice::new(&header), IoSlice::new(parameter)],
        )
    }
}

fn write_parameter_update_request<S: HciSocket>(
    socket: &S,
    identifier: u8,
    handle: u16,
    parameters: &ConnectionParameters,
) -> bool {
    let data = ConnectionUpdateData::new(handle, parameters).signal_data();

    let headers = ParameterUpdateRequestHeaders::new(handle, identifier);

    let indicator = [ACL_PKT];

    write_packet(
        socket,
        &[
            IoSlice::new(&indicator),
            IoSlice::new(&headers.acl),
            IoSlice::new(&headers.l2cap),
            IoSlice::new(&headers.signal),
            IoSlice::new(&data),
        ],
    )
}

/// A channel to the HCI of one adapter
///
/// A channel without a socket is invalid, every operation on it fails.
pub struct HciChannel<S> {
    socket: Option<S>,
    running_events: BTreeSet<Events>,
    signal_identifier: Arc<AtomicU8>,
}

impl<S> HciChannel<S> {
    pub fn new(socket: S) -> Self {
        HciChannel {
            socket: Some(socket),
            running_events: BTreeSet::new(),
            signal_identifier: Arc::default(),
        }
    }

    /// Create a channel that failed to bind
    pub fn invalid() -> Self {
        HciChannel {
            socket: None,
            running_events: BTreeSet::new(),
            signal_identifier: Arc::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.socket.is_some()
    }

    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// The events that are currently monitored
    pub fn running_events(&self) -> impl Iterator<Item = Events> + '_ {
        self.running_events.iter().copied()
    }

    fn next_signal_identifier(&self) -> u8 {
        next_signal_identifier(&self.signal_identifier)
    }

    /// Get a handle for writing commands while the channel is owned by a readiness loop
    ///
    /// The writer shares the signaling identifiers of this channel. `None` is returned for an
    /// invalid channel.
    pub fn command_writer(&self) -> Option<CommandWriter<S>>
    where
        S: Clone,
    {
        Some(CommandWriter {
            socket: self.socket.clone()?,
            signal_identifier: self.signal_identifier.clone(),
        })
    }
}

impl<S: HciSocket> HciChannel<S> {
    /// Read-modify-write of the socket filter
    fn update_filter<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut HciFilter),
    {
        let socket = match self.socket {
            Some(ref socket) => socket,
            None => return false,
        };

        let mut filter = match socket.filter() {
            Ok(filter) => filter,
            Err(e) => {
                log::warn!("Could not get the HCI socket filter: {}", e);
                return false;
            }
        };

        modify(&mut filter);

        match socket.set_filter(&filter) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not set the HCI socket filter: {}", e);
                false
            }
        }
    }

    /// Add `event` to the events passed by the socket filter
    ///
    /// Monitoring an event that is already monitored does nothing.
    pub fn monitor_event(&mut self, event: Events) -> bool {
        if !self.is_valid() {
            return false;
        }

        if self.running_events.contains(&event) {
            return true;
        }

        let updated = self.update_filter(|filter| {
            filter.set_packet_type(EVENT_PKT);
            filter.set_event(event.code());
        });

        if updated {
            self.running_events.insert(event);
        }

        updated
    }

    /// Add ACL data to the packets passed by the socket filter
    pub fn monitor_acl_packets(&mut self) -> bool {
        self.update_filter(|filter| {
            filter.set_packet_type(ACL_PKT);
            filter.set_all_events();
        })
    }

    /// Remove everything from the socket filter
    pub fn stop_events(&mut self) {
        let socket = match self.socket {
            Some(ref socket) => socket,
            None => return,
        };

        if let Err(e) = socket.set_filter(&HciFilter::new()) {
            log::warn!("Could not clear the HCI socket filter: {}", e);
        }

        self.running_events.clear();
    }

    /// Install the filters of `config`
    ///
    /// This returns false if any of the events or the ACL data could not be monitored.
    pub fn configure(&mut self, config: &ChannelConfig) -> bool {
        let events = config
            .events
            .iter()
            .fold(true, |ok, event| self.monitor_event(*event) && ok);

        if config.monitor_acl {
            self.monitor_acl_packets() && events
        } else {
            events
        }
    }

    /// Process a readiness notification of the socket
    ///
    /// This reads a single packet from the socket and decodes it.
    pub fn on_readable<K: EventSink>(&mut self, sink: &mut K) {
        let socket = match self.socket {
            Some(ref socket) => socket,
            None => return,
        };

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        let len = match socket.read(&mut buffer) {
            Ok(len) => len,
            Err(ref e) if is_transient(e) => return,
            Err(e) => {
                log::warn!("Could not read from the HCI socket: {}", e);
                sink.read_error(&e);
                return;
            }
        };

        self.dispatch(&buffer[..len], sink)
    }

    fn dispatch<K: EventSink>(&self, packet: &[u8], sink: &mut K) {
        let indicator = match packet.first() {
            Some(indicator) => *indicator,
            None => return,
        };

        log::trace!("received HCI packet {:x?}", packet);

        let decoded = match PacketType::try_from(indicator) {
            Ok(PacketType::Event) => {
                decode_event(&packet[1..], |handle| self.address_for_connection_handle(handle))
            }
            Ok(PacketType::AclData) => decode_acl(&packet[1..]),
            _ => {
                log::debug!("Ignoring HCI packet with indicator {:#x}", indicator);
                None
            }
        };

        if let Some(event) = decoded {
            sink.event(event)
        }
    }

    fn connections(&self) -> Option<Vec<ConnectionInfo>> {
        match self.socket.as_ref()?.connections() {
            Ok(connections) => Some(connections),
            Err(e) => {
                log::warn!("Could not get the connection list: {}", e);
                None
            }
        }
    }

    /// Get the address of the peer of the connection with `handle`
    ///
    /// The kernel is asked for its connection list every time this is called.
    pub fn address_for_connection_handle(&self, handle: u16) -> Option<BluetoothDeviceAddress> {
        self.connections()?
            .into_iter()
            .find(|info| info.handle == handle)
            .map(|info| info.address)
    }

    /// Get the connection handles of every LE connection of the adapter
    pub fn active_le_connections(&self) -> Vec<u16> {
        self.connections()
            .unwrap_or_default()
            .into_iter()
            .filter(|info| info.link_type == LE_LINK)
            .map(|info| info.handle)
            .collect()
    }

    /// Send a HCI command
    pub fn send_command(&self, opcode: Opcode, parameter: &[u8]) -> bool {
        match self.socket {
            Some(ref socket) => write_command(socket, opcode, parameter),
            None => false,
        }
    }

    /// Send the HCI command *LE Connection Update*
    ///
    /// Parameters out of range are forced into range.
    pub fn send_connection_update_command(&self, handle: u16, parameters: &ConnectionParameters) -> bool {
        let data = ConnectionUpdateData::new(handle, parameters);

        self.send_command(Opcode::LE_CONNECTION_UPDATE, &data.command_parameter())
    }

    /// Send the L2CAP signal *Connection Parameter Update Request*
    ///
    /// This is used instead of [`send_connection_update_command`] when this device is the
    /// peripheral of the connection.
    ///
    /// [`send_connection_update_command`]: HciChannel::send_connection_update_command
    pub fn send_connection_parameter_update_request(&self, handle: u16, parameters: &ConnectionParameters) -> bool {
        match self.socket {
            Some(ref socket) => {
                write_parameter_update_request(socket, self.next_signal_identifier(), handle, parameters)
            }
            None => false,
        }
    }
}

/// The outbound half of a [`HciChannel`]
///
/// A writer holds its own handle to the socket of the channel, so commands can be sent from
/// another thread while the channel is busy reading.
#[derive(Clone)]
pub struct CommandWriter<S> {
    socket: S,
    signal_identifier: Arc<AtomicU8>,
}

impl<S: HciSocket> CommandWriter<S> {
    /// Send a HCI command
    pub fn send_command(&self, opcode: Opcode, parameter: &[u8]) -> bool {
        write_command(&self.socket, opcode, parameter)
    }

    /// Send the HCI command *LE Connection Update*
    pub fn send_connection_update_command(&self, handle: u16, parameters: &ConnectionParameters) -> bool {
        let data = ConnectionUpdateData::new(handle, parameters);

        self.send_command(Opcode::LE_CONNECTION_UPDATE, &data.command_parameter())
    }

    /// Send the L2CAP signal *Connection Parameter Update Request*
    pub fn send_connection_parameter_update_request(&self, handle: u16, parameters: &ConnectionParameters) -> bool {
        let identifier = next_signal_identifier(&self.signal_identifier);

        write_parameter_update_request(&self.socket, identifier, handle, parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodedEvent;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn init_logger() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Trace, simplelog::Config::default());
    }

    #[derive(Default)]
    struct MockSocket {
        reads: RefCell<VecDeque<io::Result<Vec<u8>>>>,
        write_errors: RefCell<VecDeque<io::Error>>,
        written: RefCell<Vec<Vec<u8>>>,
        filter: Cell<HciFilter>,
        filter_gets: Cell<usize>,
        filter_sets: Cell<usize>,
        fail_filter: Cell<bool>,
        connections: Vec<ConnectionInfo>,
        fail_connections: bool,
    }

    impl MockSocket {
        fn with_reads<I: IntoIterator<Item = io::Result<Vec<u8>>>>(reads: I) -> Self {
            MockSocket {
                reads: RefCell::new(reads.into_iter().collect()),
                ..Default::default()
            }
        }
    }

    impl HciSocket for MockSocket {
        fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
            let packet = self
                .reads
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ErrorKind::WouldBlock.into()))?;

            let len = packet.len().min(buffer.len());

            buffer[..len].copy_from_slice(&packet[..len]);

            Ok(len)
        }

        fn write_vectored(&self, buffers: &[IoSlice<'_>]) -> io::Result<usize> {
            if let Some(e) = self.write_errors.borrow_mut().pop_front() {
                return Err(e);
            }

            let packet: Vec<u8> = buffers.iter().flat_map(|b| b.iter().copied()).collect();
            let len = packet.len();

            self.written.borrow_mut().push(packet);

            Ok(len)
        }

        fn filter(&self) -> io::Result<HciFilter> {
            self.filter_gets.set(self.filter_gets.get() + 1);

            if self.fail_filter.get() {
                Err(io::Error::from_raw_os_error(9))
            } else {
                Ok(self.filter.get())
            }
        }

        fn set_filter(&self, filter: &HciFilter) -> io::Result<()> {
            self.filter_sets.set(self.filter_sets.get() + 1);

            self.filter.set(*filter);

            Ok(())
        }

        fn connections(&self) -> io::Result<Vec<ConnectionInfo>> {
            if self.fail_connections {
                Err(io::Error::from_raw_os_error(19))
            } else {
                Ok(self.connections.clone())
            }
        }
    }

    impl HciSocket for Rc<MockSocket> {
        fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
            MockSocket::read(self, buffer)
        }

        fn write_vectored(&self, buffers: &[IoSlice<'_>]) -> io::Result<usize> {
            MockSocket::write_vectored(self, buffers)
        }

        fn filter(&self) -> io::Result<HciFilter> {
            MockSocket::filter(self)
        }

        fn set_filter(&self, filter: &HciFilter) -> io::Result<()> {
            MockSocket::set_filter(self, filter)
        }

        fn connections(&self) -> io::Result<Vec<ConnectionInfo>> {
            MockSocket::connections(self)
        }
    }

    fn connection(handle: u16, address: &str, link_type: u8) -> ConnectionInfo {
        ConnectionInfo {
            handle,
            address: address.parse().unwrap(),
            link_type,
            outgoing: false,
            state: 1,
            link_mode: 0,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<DecodedEvent>,
        errors: usize,
    }

    impl EventSink for RecordingSink {
        fn event(&mut self, event: DecodedEvent) {
            self.events.push(event)
        }

        fn read_error(&mut self, _: &io::Error) {
            self.errors += 1
        }
    }

    #[test]
    fn encryption_change_dispatch() {
        init_logger();

        let packet = vec![EVENT_PKT, 0x08, 4, 0x00, 0x01, 0x00, 0x01];

        let socket = MockSocket {
            connections: vec![
                connection(0x0003, "11:22:33:44:55:66", LE_LINK),
                connection(0x0001, "AA:BB:CC:DD:EE:FF", LE_LINK),
            ],
            ..MockSocket::with_reads([Ok(packet.clone())])
        };

        let mut channel = HciChannel::new(socket);
        let mut events = Vec::new();

        channel.on_readable(&mut events);

        assert_eq!(
            vec![DecodedEvent::EncryptionChanged {
                address: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
                success: true
            }],
            events
        );

        // The handle is no longer within the connection list
        let mut channel = HciChannel::new(MockSocket {
            connections: vec![connection(0x0003, "11:22:33:44:55:66", LE_LINK)],
            ..MockSocket::with_reads([Ok(packet.clone())])
        });

        channel.on_readable(&mut events);

        assert_eq!(1, events.len());

        // Nor when the connection list cannot be read
        let mut channel = HciChannel::new(MockSocket {
            fail_connections: true,
            ..MockSocket::with_reads([Ok(packet)])
        });

        channel.on_readable(&mut events);

        assert_eq!(1, events.len());
    }

    #[test]
    fn command_complete_and_acl_dispatch() {
        let mut acl = vec![ACL_PKT, 0x40, 0x20, 21, 0, 17, 0, 0x06, 0x00, 0x0a];

        acl.extend(1..=16u8);

        let mut channel = HciChannel::new(MockSocket::with_reads([
            Ok(vec![EVENT_PKT, 0x0E, 6, 0x01, 0x03, 0x0C, 0x00, 0x01, 0x02]),
            Ok(acl),
        ]));

        let mut events = Vec::new();

        channel.on_readable(&mut events);
        channel.on_readable(&mut events);

        let mut key = [0u8; 16];

        key.iter_mut().zip(1..=16u8).for_each(|(k, v)| *k = v);

        assert_eq!(
            vec![
                DecodedEvent::CommandCompleted {
                    opcode: 0x0C03,
                    status: 0,
                    data: vec![0x01, 0x02]
                },
                DecodedEvent::SignatureKeyReceived {
                    handle: 0x40,
                    remote: true,
                    key
                }
            ],
            events
        );
    }

    #[test]
    fn unknown_and_empty_packets() {
        let mut channel = HciChannel::new(MockSocket::with_reads([
            Ok(vec![0x03, 0x01, 0x00, 0x00]),
            Ok(vec![0xFF, 0x01]),
            Ok(vec![]),
            Ok(vec![COMMAND_PKT, 0x03, 0x0C, 0x00]),
        ]));

        let mut sink = RecordingSink::default();

        for _ in 0..5 {
            channel.on_readable(&mut sink);
        }

        assert!(sink.events.is_empty());
        assert_eq!(0, sink.errors);
    }

    #[test]
    fn read_errors() {
        let mut channel = HciChannel::new(MockSocket::with_reads([
            Err(ErrorKind::WouldBlock.into()),
            Err(ErrorKind::Interrupted.into()),
            Err(io::Error::from_raw_os_error(5)),
            Ok(vec![EVENT_PKT, 0x0E, 4, 0x01, 0x03, 0x0C, 0x00]),
        ]));

        let mut sink = RecordingSink::default();

        for _ in 0..4 {
            channel.on_readable(&mut sink);
        }

        assert_eq!(1, sink.errors);
        assert_eq!(1, sink.events.len());
    }

    #[test]
    fn monitor_event_is_idempotent() {
        let mut channel = HciChannel::new(MockSocket::default());

        assert!(channel.monitor_event(Events::EncryptChange));

        let socket = channel.socket().unwrap();
        let once = socket.filter.get();

        assert!(channel.monitor_event(Events::EncryptChange));

        let socket = channel.socket().unwrap();

        assert_eq!(once, socket.filter.get());
        assert_eq!(1, socket.filter_gets.get());
        assert_eq!(1, socket.filter_sets.get());
        assert!(once.has_packet_type(EVENT_PKT));
        assert!(once.has_event(0x08));
    }

    #[test]
    fn events_accumulate_until_stopped() {
        let mut channel = HciChannel::new(MockSocket::default());

        assert!(channel.monitor_event(Events::EncryptChange));
        assert!(channel.monitor_event(Events::LeMeta));
        assert!(channel.monitor_acl_packets());

        let filter = channel.socket().unwrap().filter.get();

        assert!(filter.has_packet_type(EVENT_PKT));
        assert!(filter.has_packet_type(ACL_PKT));
        assert!(filter.has_event(0x08) && filter.has_event(0x3E) && filter.has_event(0x0E));

        assert_eq!(
            vec![Events::EncryptChange, Events::LeMeta],
            channel.running_events().collect::<Vec<_>>()
        );

        channel.stop_events();

        assert_eq!(HciFilter::new(), channel.socket().unwrap().filter.get());
        assert_eq!(0, channel.running_events().count());

        // After stopping the event must be installed again
        assert!(channel.monitor_event(Events::EncryptChange));
        assert_eq!(4, channel.socket().unwrap().filter_gets.get());
    }

    #[test]
    fn monitor_event_failure() {
        let socket = MockSocket::default();

        socket.fail_filter.set(true);

        let mut channel = HciChannel::new(socket);

        assert!(!channel.monitor_event(Events::LeMeta));
        assert!(!channel.monitor_acl_packets());
        assert_eq!(0, channel.running_events().count());
        assert_eq!(0, channel.socket().unwrap().filter_sets.get());
    }

    #[test]
    fn configure_installs_defaults() {
        let mut channel = HciChannel::new(MockSocket::default());

        assert!(channel.configure(&ChannelConfig::default()));

        let filter = channel.socket().unwrap().filter.get();

        assert!(filter.has_packet_type(EVENT_PKT));
        assert!(filter.has_packet_type(ACL_PKT));
        assert_eq!(2, channel.running_events().count());
    }

    #[test]
    fn invalid_channel() {
        let mut channel = HciChannel::<Rc<MockSocket>>::invalid();
        let mut events = Vec::new();

        assert!(!channel.is_valid());
        assert!(!channel.monitor_event(Events::LeMeta));
        assert!(!channel.monitor_acl_packets());
        assert!(!channel.configure(&ChannelConfig::default()));
        assert!(!channel.send_command(Opcode::from_raw(0x0C03), &[]));
        assert!(!channel.send_connection_update_command(1, &ConnectionParameters::default()));
        assert!(!channel.send_connection_parameter_update_request(1, &ConnectionParameters::default()));
        assert_eq!(None, channel.address_for_connection_handle(1));
        assert!(channel.active_le_connections().is_empty());
        assert!(channel.command_writer().is_none());

        channel.stop_events();
        channel.on_readable(&mut events);

        assert!(events.is_empty());
    }

    #[test]
    fn send_command_packets() {
        let channel = HciChannel::new(MockSocket::default());

        assert!(channel.send_command(Opcode::from_raw(0x0C03), &[]));
        assert!(channel.send_command(Opcode::new(0x08, 0x000A), &[0x01]));
        assert!(!channel.send_command(Opcode::new(0x08, 0x0008), &[0u8; 256]));

        assert_eq!(
            vec![vec![COMMAND_PKT, 0x03, 0x0C, 0], vec![COMMAND_PKT, 0x0A, 0x20, 1, 0x01]],
            *channel.socket().unwrap().written.borrow()
        );
    }

    #[test]
    fn send_retries_transient_errors() {
        let socket = MockSocket {
            write_errors: RefCell::new(VecDeque::from(vec![
                io::Error::from(ErrorKind::WouldBlock),
                io::Error::from(ErrorKind::Interrupted),
            ])),
            ..Default::default()
        };

        let channel = HciChannel::new(socket);

        assert!(channel.send_command(Opcode::from_raw(0x0C03), &[]));
        assert_eq!(1, channel.socket().unwrap().written.borrow().len());

        channel
            .socket()
            .unwrap()
            .write_errors
            .borrow_mut()
            .push_back(io::Error::from_raw_os_error(32));

        assert!(!channel.send_command(Opcode::from_raw(0x0C03), &[]));
        assert_eq!(1, channel.socket().unwrap().written.borrow().len());
    }

    #[test]
    fn connection_update_command_is_clamped() {
        let channel = HciChannel::new(MockSocket::default());

        let parameters = ConnectionParameters {
            min_interval: 1.0,
            max_interval: 5000.0,
            latency: 600,
            supervision_timeout: 50,
        };

        assert!(channel.send_connection_update_command(5, &parameters));

        assert_eq!(
            vec![vec![
                COMMAND_PKT, 0x13, 0x20, 14, 5, 0, 6, 0, 0x80, 0x0C, 0xF3, 0x01, 10, 0, 1, 0, 0xFF, 0xFF
            ]],
            *channel.socket().unwrap().written.borrow()
        );
    }

    #[test]
    fn connection_parameter_update_request() {
        let channel = HciChannel::new(MockSocket::default());

        let parameters = ConnectionParameters {
            min_interval: 30.0,
            max_interval: 50.0,
            latency: 0,
            supervision_timeout: 6000,
        };

        assert!(channel.send_connection_parameter_update_request(0x0040, &parameters));
        assert!(channel.send_connection_parameter_update_request(0x0040, &parameters));

        let written = channel.socket().unwrap().written.borrow();

        assert_eq!(
            vec![
                ACL_PKT, 0x40, 0x00, 16, 0, 12, 0, 0x05, 0x00, 0x12, 1, 8, 0, 24, 0, 40, 0, 0, 0, 0x58, 0x02
            ],
            written[0]
        );

        // identifier increments
        assert_eq!(2, written[1][10]);
    }

    #[test]
    fn signal_identifier_skips_zero() {
        let channel = HciChannel::new(MockSocket::default());

        let identifiers: Vec<u8> = (0..256).map(|_| channel.next_signal_identifier()).collect();

        assert_eq!(1, identifiers[0]);
        assert_eq!(255, identifiers[254]);
        assert_eq!(1, identifiers[255]);
    }

    #[test]
    fn writer_shares_the_socket_and_identifiers() {
        let socket = Rc::new(MockSocket::default());
        let channel = HciChannel::new(socket.clone());
        let writer = channel.command_writer().unwrap();

        let parameters = ConnectionParameters::default();

        assert!(channel.send_connection_parameter_update_request(0x0040, &parameters));
        assert!(writer.send_connection_parameter_update_request(0x0040, &parameters));
        assert!(writer.clone().send_connection_parameter_update_request(0x0040, &parameters));
        assert!(writer.send_command(Opcode::from_raw(0x0C03), &[]));
        assert!(writer.send_connection_update_command(5, &parameters));

        let written = socket.written.borrow();

        assert_eq!(5, written.len());
        assert_eq!(vec![1, 2, 3], written[..3].iter().map(|p| p[10]).collect::<Vec<_>>());
        assert_eq!(vec![COMMAND_PKT, 0x03, 0x0C, 0], written[3]);
        assert_eq!(&[COMMAND_PKT, 0x13, 0x20, 14, 5, 0], &written[4][..6]);
    }

    #[test]
    fn le_connections() {
        let channel = HciChannel::new(MockSocket {
            connections: vec![
                connection(0x0001, "AA:BB:CC:DD:EE:FF", LE_LINK),
                connection(0x0002, "11:22:33:44:55:66", 0x01),
                connection(0x0003, "11:22:33:44:55:77", LE_LINK),
            ],
            ..Default::default()
        });

        assert_eq!(vec![0x0001, 0x0003], channel.active_le_connections());
        assert_eq!(
            Some("11:22:33:44:55:66".parse().unwrap()),
            channel.address_for_connection_handle(0x0002)
        );
        assert_eq!(None, channel.address_for_connection_handle(0x0004));
    }
}
