//! Session data model: peers, connection state, groups, and the facts the platform reports.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::address::MacAddress;

/// A nearby P2P device. Identity is the address; the registry replaces entries, never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub name: String,
    pub address: MacAddress,
}

impl Peer {
    pub fn new(name: impl Into<String>, address: MacAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Wire value used by the C ABI.
    pub fn as_raw(self) -> i32 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

/// A formed P2P group. Exists only between group-joined and group-lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Whether this device is the group owner.
    pub is_owner: bool,
    pub owner_address: MacAddress,
    pub interface_name: String,
    pub owner_ip: IpAddr,
}

/// Connection info reply from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub group_formed: bool,
    pub is_group_owner: bool,
    /// Group owner IP, when the platform knows it.
    #[serde(default)]
    pub group_owner_ip: Option<IpAddr>,
}

/// Group info reply from the platform (the part of it we use).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    pub owner_address: MacAddress,
    pub interface_name: String,
}

/// This device, as reported by the device-info query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    /// Not exposed to unprivileged apps on every platform.
    #[serde(default)]
    pub address: Option<MacAddress>,
}

/// Notification delivered to the session observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Notification {
    RosterChanged(Vec<Peer>),
    ConnectionStateChanged(ConnectionState),
    GroupJoined(Group),
    GroupLost,
}
