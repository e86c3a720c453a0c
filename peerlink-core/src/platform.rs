//! The platform P2P service the session drives (e.g. Android's WifiP2pManager or wpa_supplicant).
//! Every request returns immediately; results come back later as `PlatformEvent`s or promise
//! resolutions on the same event loop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::MacAddress;
use crate::promise::PromiseId;

/// Opaque channel handle issued by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelHandle(pub u64);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// How the group client gets its IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpProvisioning {
    /// IPv6 link-local addressing derived from the interface MAC.
    Ipv6LinkLocal,
    /// Whatever the platform does by default (typically DHCPv4).
    PlatformDefault,
}

/// Connection request. Role negotiation is left to the platform, biased by the intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub device_address: MacAddress,
    /// Group owner intent, 0..=15. `None` lets the platform choose.
    pub group_owner_intent: Option<u8>,
    pub provisioning: IpProvisioning,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("P2P service unavailable")]
    Unavailable,
    #[error("channel initialization failed: {0}")]
    ChannelInit(String),
}

pub trait PlatformService {
    fn initialize_channel(&mut self) -> Result<ChannelHandle, PlatformError>;

    /// Start delivering broadcast events (state, peers, connection, device changes).
    fn register_receiver(&mut self);

    fn unregister_receiver(&mut self);

    fn request_device_info(&mut self, channel: ChannelHandle);

    fn request_connection_info(&mut self, channel: ChannelHandle);

    fn request_group_info(&mut self, channel: ChannelHandle);

    fn request_peer_list(&mut self, channel: ChannelHandle);

    fn discover_peers(&mut self, channel: ChannelHandle, promise: PromiseId);

    fn connect(&mut self, channel: ChannelHandle, config: &ConnectConfig, promise: PromiseId);

    /// Whether connect requests can ask for IPv6 link-local client provisioning.
    fn supports_ipv6_link_local(&self) -> bool;
}
