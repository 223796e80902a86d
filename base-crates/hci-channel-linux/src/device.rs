//! Linux Bluetooth device functionality
//!
//! These are the structures and `ioctl` calls of the Linux Bluetooth driver used for finding an
//! adapter and for getting the connections of an adapter. These are linux specific and have no
//! relation to the Bluetooth Specification.

use hci_channel::{BluetoothDeviceAddress, ConnectionInfo};
use nix::libc;
use std::os::raw::c_int;

pub(crate) const BTPROTO_HCI: c_int = 1;

/// A raw channel works with the linux hci implementation (the kernel keeps control of the device)
pub(crate) const HCI_CHANNEL_RAW: u16 = 0;

pub(crate) const SOL_HCI: c_int = 0;
pub(crate) const HCI_FILTER: c_int = 2;

/// The maximum number of devices listed by `HCIGETDEVLIST`
const HCI_MAX_DEV: usize = 16;

/// The maximum number of connections listed by `HCIGETCONNLIST`
const HCI_MAX_CONN: usize = 20;

/// Device flag for an adapter that is up
const HCI_UP: usize = 0;

pub(crate) fn test_flag(bit: usize, field: &[u32]) -> bool {
    1 == (field[bit >> 5] >> (bit as u32 & 31)) & 1
}

#[repr(C)]
#[derive(Default)]
pub struct sockaddr_hci {
    pub hci_family: libc::sa_family_t,
    pub hci_dev: u16,
    pub hci_channel: u16,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
pub struct hci_dev_req {
    dev_id: u16,
    dev_opt: u32,
}

#[repr(C)]
pub struct hci_dev_list_req {
    dev_num: u16,
    dev_req: [hci_dev_req; HCI_MAX_DEV],
}

impl Default for hci_dev_list_req {
    fn default() -> Self {
        hci_dev_list_req {
            dev_num: HCI_MAX_DEV as u16,
            dev_req: [hci_dev_req::default(); HCI_MAX_DEV],
        }
    }
}

impl hci_dev_list_req {
    /// Iterate over the devices filled in by the kernel
    fn iter(&self) -> impl Iterator<Item = &hci_dev_req> {
        self.dev_req.iter().take(usize::from(self.dev_num).min(HCI_MAX_DEV))
    }
}

#[repr(C)]
#[derive(Default)]
pub struct hci_dev_info {
    dev_id: u16,
    name: [std::os::raw::c_char; 8],
    bdaddr: [u8; 6],
    flags: u32,
    r#type: u8,
    features: [u8; 8],
    pkt_type: u32,
    link_policy: u32,
    link_mode: u32,
    acl_mtu: u16,
    acl_pkts: u16,
    sco_mtu: u16,
    sco_pkts: u16,
    stat: hci_dev_stats,
}

#[repr(C)]
#[derive(Default)]
pub struct hci_dev_stats {
    err_rx: u32,
    err_tx: u32,
    cmd_tx: u32,
    evt_rx: u32,
    acl_tx: u32,
    acl_rx: u32,
    sco_tx: u32,
    sco_rx: u32,
    byte_rx: u32,
    byte_tx: u32,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
pub struct hci_conn_info {
    handle: u16,
    bdaddr: [u8; 6],
    r#type: u8,
    out: u8,
    state: u16,
    link_mode: u32,
}

#[repr(C)]
pub struct hci_conn_list_req {
    dev_id: u16,
    conn_num: u16,
    conn_info: [hci_conn_info; HCI_MAX_CONN],
}

impl hci_conn_list_req {
    fn new(dev_id: u16) -> Self {
        hci_conn_list_req {
            dev_id,
            conn_num: HCI_MAX_CONN as u16,
            conn_info: [hci_conn_info::default(); HCI_MAX_CONN],
        }
    }
}

impl From<&hci_conn_info> for ConnectionInfo {
    fn from(info: &hci_conn_info) -> Self {
        ConnectionInfo {
            handle: info.handle,
            address: BluetoothDeviceAddress(info.bdaddr),
            link_type: info.r#type,
            outgoing: info.out != 0,
            state: info.state,
            link_mode: info.link_mode,
        }
    }
}

/// Information on a Bluetooth adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub index: u16,
    pub address: BluetoothDeviceAddress,
    pub name: String,
    pub is_up: bool,
}

impl From<&hci_dev_info> for AdapterInfo {
    fn from(dev_info: &hci_dev_info) -> Self {
        let name_bytes: Vec<u8> = dev_info
            .name
            .iter()
            .map(|c| *c as u8)
            .take_while(|c| *c != 0)
            .collect();

        AdapterInfo {
            index: dev_info.dev_id,
            address: BluetoothDeviceAddress(dev_info.bdaddr),
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
            is_up: test_flag(HCI_UP, &[dev_info.flags]),
        }
    }
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "hci{} address: {}, is_up: {}", self.index, self.address, self.is_up)?;

        if !self.name.is_empty() {
            write!(f, " name: {}", self.name)?;
        }

        Ok(())
    }
}

/// Get every adapter the kernel knows of
///
/// Adapters whose information cannot be retrieved are skipped. This will list a maximum of 16
/// devices.
pub(crate) fn get_adapters(fd: c_int) -> nix::Result<Vec<AdapterInfo>> {
    let mut list = hci_dev_list_req::default();

    unsafe { hci_get_dev_list(fd, &mut list)? };

    let adapters = list
        .iter()
        .filter_map(|dev_req| {
            let mut dev_info = hci_dev_info {
                dev_id: dev_req.dev_id,
                ..Default::default()
            };

            match unsafe { hci_get_dev_info(fd, &mut dev_info) } {
                Ok(_) => Some(AdapterInfo::from(&dev_info)),
                Err(e) => {
                    log::debug!("skipping hci{}, could not get device info: {}", dev_req.dev_id, e);
                    None
                }
            }
        })
        .collect();

    Ok(adapters)
}

/// Get the current connections of the adapter `dev_id`
pub(crate) fn get_connections(fd: c_int, dev_id: u16) -> nix::Result<Vec<ConnectionInfo>> {
    let mut list = hci_conn_list_req::new(dev_id);

    unsafe { hci_get_conn_list(fd, &mut list)? };

    let count = usize::from(list.conn_num).min(HCI_MAX_CONN);

    Ok(list.conn_info[..count].iter().map(ConnectionInfo::from).collect())
}

///////////
// ioctl structures
////

// ioclt magic for the IOCTL values
const HCI_IOC_MAGIC: u8 = b'H';

const HCI_IOC_HCIGETDEVLIST: u8 = 210;
const HCI_IOC_HCIGETDEVINFO: u8 = 211;
const HCI_IOC_HCIGETCONNLIST: u8 = 212;

//////
// The following functions cannot use nix's handy ioctl_read! macros because the request code
// does not use the same type as the structure passed to the ioctl

unsafe fn hci_get_dev_list(fd: c_int, list: &mut hci_dev_list_req) -> nix::Result<c_int> {
    use nix::libc::c_void;
    use std::mem::size_of;

    let request_code = nix::request_code_read!(HCI_IOC_MAGIC, HCI_IOC_HCIGETDEVLIST, size_of::<c_int>());

    let raw_errno = libc::ioctl(fd, request_code, list as *mut _ as *mut c_void);

    nix::errno::Errno::result(raw_errno)
}

unsafe fn hci_get_dev_info(fd: c_int, info: &mut hci_dev_info) -> nix::Result<c_int> {
    use nix::libc::c_void;
    use std::mem::size_of;

    let request_code = nix::request_code_read!(HCI_IOC_MAGIC, HCI_IOC_HCIGETDEVINFO, size_of::<c_int>());

    let raw_errno = libc::ioctl(fd, request_code, info as *mut _ as *mut c_void);

    nix::errno::Errno::result(raw_errno)
}

unsafe fn hci_get_conn_list(fd: c_int, list: &mut hci_conn_list_req) -> nix::Result<c_int> {
    use nix::libc::c_void;
    use std::mem::size_of;

    let request_code = nix::request_code_read!(HCI_IOC_MAGIC, HCI_IOC_HCIGETCONNLIST, size_of::<c_int>());

    let raw_errno = libc::ioctl(fd, request_code, list as *mut _ as *mut c_void);

    nix::errno::Errno::result(raw_errno)
}
