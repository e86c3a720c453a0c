//! Platform events and the stateless router that sends each one to the component owning it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tracker::TrackerEvent;
use crate::types::{ConnectionInfo, DeviceIdentity, GroupDetails, Peer};

/// Everything the platform can tell the session, broadcasts and query replies alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// P2P radio enabled/disabled.
    StateChanged { enabled: bool },
    /// Peer set changed; the list itself must be requested.
    PeersChanged,
    ConnectionChanged {
        connected_or_connecting: bool,
        connected: bool,
    },
    /// This device's P2P details changed.
    DeviceChanged,
    ChannelLost,
    ConnectionInfo { info: ConnectionInfo },
    GroupInfo {
        #[serde(default)]
        group: Option<GroupDetails>,
    },
    PeerList { peers: Vec<Peer> },
    DeviceInfo {
        #[serde(default)]
        device: Option<DeviceIdentity>,
    },
    /// A broadcast the host could not classify.
    Unknown { action: String },
}

impl PlatformEvent {
    /// Broadcasts stop arriving while the session is paused; query replies do not.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            PlatformEvent::StateChanged { .. }
                | PlatformEvent::PeersChanged
                | PlatformEvent::ConnectionChanged { .. }
                | PlatformEvent::DeviceChanged
                | PlatformEvent::Unknown { .. }
        )
    }
}

/// Session-level signals that don't belong to a leaf component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    RadioState(bool),
    RefreshPeers,
    DeviceInfo(Option<DeviceIdentity>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Registry(Vec<Peer>),
    Tracker(TrackerEvent),
    ChannelLost,
    Session(SessionSignal),
    Dropped,
}

pub fn route(event: PlatformEvent) -> Route {
    debug!(?event, "platform event");
    match event {
        PlatformEvent::StateChanged { enabled } => {
            Route::Session(SessionSignal::RadioState(enabled))
        }
        PlatformEvent::PeersChanged => Route::Session(SessionSignal::RefreshPeers),
        PlatformEvent::ConnectionChanged {
            connected_or_connecting,
            connected,
        } => Route::Tracker(TrackerEvent::ConnectionChanged {
            connected_or_connecting,
            connected,
        }),
        PlatformEvent::DeviceChanged => Route::Tracker(TrackerEvent::DeviceChanged),
        PlatformEvent::ChannelLost => Route::ChannelLost,
        PlatformEvent::ConnectionInfo { info } => {
            Route::Tracker(TrackerEvent::ConnectionInfo(info))
        }
        PlatformEvent::GroupInfo { group } => Route::Tracker(TrackerEvent::GroupInfo(group)),
        PlatformEvent::PeerList { peers } => Route::Registry(peers),
        PlatformEvent::DeviceInfo { device } => Route::Session(SessionSignal::DeviceInfo(device)),
        PlatformEvent::Unknown { action } => {
            warn!(%action, "unknown platform event; dropped");
            Route::Dropped
        }
    }
}
