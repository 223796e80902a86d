use crate::{BluetoothDeviceAddress, Events};

/// Configuration of a HCI channel
///
/// The default is what a LE host needs: any adapter, the encryption change and LE meta events,
/// and ACL data for receiving the signature resolving key of a peer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// The public address of the adapter, `None` for any adapter
    pub adapter: Option<BluetoothDeviceAddress>,
    /// Events installed into the socket filter
    pub events: Vec<Events>,
    pub monitor_acl: bool,
}

impl ChannelConfig {
    /// The adapter address to bind to (the wildcard address when no adapter is configured)
    pub fn adapter_address(&self) -> BluetoothDeviceAddress {
        self.adapter.unwrap_or(BluetoothDeviceAddress::ANY)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            adapter: None,
            events: vec![Events::EncryptChange, Events::LeMeta],
            monitor_acl: true,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;
    use crate::ConnectionParameters;

    #[test]
    fn config_round_trip() {
        let config = ChannelConfig {
            adapter: Some("AA:BB:CC:DD:EE:FF".parse().unwrap()),
            events: vec![Events::CommandComplete, Events::LeMeta],
            monitor_acl: false,
        };

        let bytes = bincode::serialize(&config).unwrap();

        assert_eq!(config, bincode::deserialize::<ChannelConfig>(&bytes).unwrap());
    }

    #[test]
    fn parameters_round_trip() {
        let parameters = ConnectionParameters {
            min_interval: 30.0,
            max_interval: 50.0,
            latency: 4,
            supervision_timeout: 6000,
        };

        let bytes = bincode::serialize(&parameters).unwrap();

        assert_eq!(parameters, bincode::deserialize::<ConnectionParameters>(&bytes).unwrap());
    }
}
