//! A HCI channel for Linux
//!
//! Linux has a driver for the interface to the controller to provide a standard means of
//! communication. This opens a raw HCI socket with that driver for a Bluetooth adapter of the
//! system, while the kernel keeps on managing the adapter.
//!
//! ```no_run
//! use hci_channel::{BluetoothDeviceAddress, DecodedEvent, Events};
//!
//! let mut channel = hci_channel_linux::open(BluetoothDeviceAddress::ANY);
//!
//! assert!(channel.monitor_event(Events::LeMeta));
//!
//! let dispatcher = hci_channel_linux::Dispatcher::new(&channel).unwrap();
//!
//! let mut events: Vec<DecodedEvent> = Vec::new();
//!
//! dispatcher.run(&mut channel, &mut events).unwrap();
//! ```

use hci_channel::{BluetoothDeviceAddress, ChannelConfig, ConnectionInfo, HciChannel, HciFilter, HciSocket};
use std::error;
use std::fmt;
use std::io::{self, IoSlice};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

#[allow(non_camel_case_types, dead_code)]
mod device;
mod dispatch;

pub use device::AdapterInfo;
pub use dispatch::{spawn, ChannelTask, Dispatcher, ExitHandle};

#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    SocketOpen(nix::Error),
    DeviceList(nix::Error),
    NoSuchAdapter(BluetoothDeviceAddress),
    BindFailed { device: u16, errno: nix::Error },
    InvalidChannel,
    IOError(nix::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(from base-crate: hci-channel-linux) ")?;

        match *self {
            Error::SocketOpen(ref errno) => write!(f, "Cannot open a HCI socket: {}", errno),

            Error::DeviceList(ref errno) => write!(f, "Cannot get the list of adapters: {}", errno),

            Error::NoSuchAdapter(ref address) => write!(f, "No adapter with address {}", address),

            Error::BindFailed { device, ref errno } => write!(f, "Cannot bind to hci{}: {}", device, errno),

            Error::InvalidChannel => write!(f, "The HCI channel is not bound"),

            Error::IOError(ref errno) => write!(f, "IO error: {}", errno),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::SocketOpen(ref errno)
            | Error::DeviceList(ref errno)
            | Error::BindFailed { ref errno, .. }
            | Error::IOError(ref errno) => Some(errno),
            Error::NoSuchAdapter(_) | Error::InvalidChannel => None,
        }
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::IOError(e)
    }
}

/// Open a raw HCI socket (not yet bound to any adapter)
fn raw_hci_socket() -> nix::Result<OwnedFd> {
    use nix::libc;

    let raw_fd = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC,
            device::BTPROTO_HCI,
        )
    };

    if raw_fd < 0 {
        return Err(nix::errno::Errno::last());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(raw_fd) })
}

/// List the Bluetooth adapters of this machine
pub fn list_adapters() -> Result<Vec<AdapterInfo>, Error> {
    let sock = raw_hci_socket().map_err(Error::SocketOpen)?;

    device::get_adapters(sock.as_raw_fd()).map_err(Error::DeviceList)
}

/// A raw HCI socket bound to an adapter
///
/// Clones refer to the same socket, which is closed once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct LinuxSocket {
    fd: Arc<OwnedFd>,
    device_id: u16,
}

impl LinuxSocket {
    /// Bind to the adapter with the public address `adapter`
    ///
    /// The wildcard address [`BluetoothDeviceAddress::ANY`] selects the first adapter found on
    /// the system.
    pub fn bind(adapter: BluetoothDeviceAddress) -> Result<Self, Error> {
        use nix::libc;

        let fd = raw_hci_socket().map_err(Error::SocketOpen)?;

        let adapters = device::get_adapters(fd.as_raw_fd()).map_err(Error::DeviceList)?;

        let device_id = adapters
            .iter()
            .find(|info| adapter.is_any() || info.address == adapter)
            .map(|info| info.index)
            .ok_or(Error::NoSuchAdapter(adapter))?;

        let sa_p = &device::sockaddr_hci {
            hci_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: device_id,
            hci_channel: device::HCI_CHANNEL_RAW,
        } as *const device::sockaddr_hci as *const libc::sockaddr;

        let sa_len = std::mem::size_of::<device::sockaddr_hci>() as libc::socklen_t;

        // On failure `fd` is dropped, closing the socket
        if unsafe { libc::bind(fd.as_raw_fd(), sa_p, sa_len) } < 0 {
            return Err(Error::BindFailed {
                device: device_id,
                errno: nix::errno::Errno::last(),
            });
        }

        log::info!("bound HCI socket to hci{}", device_id);

        Ok(LinuxSocket {
            fd: Arc::new(fd),
            device_id,
        })
    }

    /// The index of the adapter (the *X* of `hciX`)
    pub fn device_id(&self) -> u16 {
        self.device_id
    }
}

impl AsFd for LinuxSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for LinuxSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl HciSocket for LinuxSocket {
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.as_raw_fd(), buffer).map_err(io::Error::from)
    }

    fn write_vectored(&self, buffers: &[IoSlice<'_>]) -> io::Result<usize> {
        nix::sys::uio::writev(self.as_fd(), buffers).map_err(io::Error::from)
    }

    fn filter(&self) -> io::Result<HciFilter> {
        use nix::libc;

        let mut filter = HciFilter::new();
        let mut len = std::mem::size_of::<HciFilter>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                device::SOL_HCI,
                device::HCI_FILTER,
                &mut filter as *mut HciFilter as *mut libc::c_void,
                &mut len,
            )
        };

        nix::errno::Errno::result(ret).map(|_| filter).map_err(io::Error::from)
    }

    fn set_filter(&self, filter: &HciFilter) -> io::Result<()> {
        use nix::libc;

        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                device::SOL_HCI,
                device::HCI_FILTER,
                filter as *const HciFilter as *const libc::c_void,
                std::mem::size_of::<HciFilter>() as libc::socklen_t,
            )
        };

        nix::errno::Errno::result(ret).map(drop).map_err(io::Error::from)
    }

    fn connections(&self) -> io::Result<Vec<ConnectionInfo>> {
        device::get_connections(self.as_raw_fd(), self.device_id).map_err(io::Error::from)
    }
}

/// Open a HCI channel to the adapter with the public address `adapter`
///
/// Failing to open the channel is logged and an invalid channel is returned. Use
/// [`LinuxSocket::bind`] for getting the error.
pub fn open(adapter: BluetoothDeviceAddress) -> HciChannel<LinuxSocket> {
    match LinuxSocket::bind(adapter) {
        Ok(socket) => HciChannel::new(socket),
        Err(e) => {
            log::warn!("{}", e);
            HciChannel::invalid()
        }
    }
}

/// Open a HCI channel and install the socket filters of `config`
pub fn open_with(config: &ChannelConfig) -> HciChannel<LinuxSocket> {
    let mut channel = open(config.adapter_address());

    if channel.is_valid() && !channel.configure(config) {
        log::warn!("not every filter of the configuration could be installed");
    }

    channel
}
