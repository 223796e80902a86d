use core::fmt;
use core::str::FromStr;

/// A Bluetooth device address
///
/// The bytes are stored in the order the controller (and the Linux kernel's `bdaddr_t`) uses,
/// which is little-endian. The address is displayed the way it is conventionally written, with
/// the most significant byte first.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BluetoothDeviceAddress(pub [u8; 6]);

impl BluetoothDeviceAddress {
    /// The wildcard address (`00:00:00:00:00:00`)
    pub const ANY: BluetoothDeviceAddress = BluetoothDeviceAddress([0; 6]);

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// Create an address from its 48 bit numeric value
    pub fn from_u64(val: u64) -> Self {
        let bytes = val.to_le_bytes();

        BluetoothDeviceAddress([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]])
    }

    pub fn to_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];

        bytes[..6].copy_from_slice(&self.0);

        u64::from_le_bytes(bytes)
    }
}

impl From<[u8; 6]> for BluetoothDeviceAddress {
    fn from(raw: [u8; 6]) -> Self {
        BluetoothDeviceAddress(raw)
    }
}

impl fmt::Display for BluetoothDeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.0;

        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// Error for an address string that is not six colon separated hexadecimal bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid Bluetooth device address '{}'", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for BluetoothDeviceAddress {
    type Err = AddressParseError;

    /// Parse an address of the form `4A:BC:19:03:99:C0`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut address = [0u8; 6];
        let mut count = 0;

        for (i, part) in s.split(':').enumerate() {
            if i >= 6 || part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AddressParseError(s.to_string()));
            }

            address[5 - i] = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;

            count += 1;
        }

        if count == 6 {
            Ok(BluetoothDeviceAddress(address))
        } else {
            Err(AddressParseError(s.to_string()))
        }
    }
}
