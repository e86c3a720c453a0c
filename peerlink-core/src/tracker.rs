//! Group/connection state tracker.
//!
//! The platform reports connection changes, connection info and group info as separate,
//! possibly duplicated and reordered callbacks. The tracker folds them into one
//! `(ConnectionState, Option<Group>)` view and emits at most one group-joined and one
//! group-lost notification per episode. Pure: the host (the session) executes the returned
//! actions.

use std::net::IpAddr;

use serde::Serialize;
use tracing::{debug, info};

use crate::types::{ConnectionInfo, ConnectionState, Group, GroupDetails, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TrackerState {
    #[default]
    Idle,
    /// Connection info requested outside a connection change (device changed while idle).
    AwaitingConnectionInfo,
    Connecting,
    ConnectedNoGroup,
    ConnectedWithGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    ConnectionChanged {
        connected_or_connecting: bool,
        connected: bool,
    },
    DeviceChanged,
    ConnectionInfo(ConnectionInfo),
    GroupInfo(Option<GroupDetails>),
}

/// What the host must do after feeding an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAction {
    Notify(Notification),
    RequestConnectionInfo,
    RequestGroupInfo,
}

#[derive(Debug, Default)]
pub struct GroupTracker {
    state: TrackerState,
    connection: ConnectionState,
    group: Option<Group>,
    /// Last connection info reply; cleared on disconnect.
    last_info: Option<ConnectionInfo>,
    /// Connection info queries issued and not yet answered.
    pending_info_queries: u32,
}

impl GroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: TrackerEvent) -> Vec<TrackerAction> {
        match event {
            TrackerEvent::ConnectionChanged {
                connected_or_connecting,
                connected,
            } => self.on_connection_changed(connected_or_connecting, connected),
            TrackerEvent::DeviceChanged => self.on_device_changed(),
            TrackerEvent::ConnectionInfo(info) => self.on_connection_info(info),
            TrackerEvent::GroupInfo(details) => self.on_group_info(details),
        }
    }

    pub fn on_connection_changed(
        &mut self,
        connected_or_connecting: bool,
        connected: bool,
    ) -> Vec<TrackerAction> {
        let mut actions = Vec::new();
        if !connected_or_connecting {
            self.state = TrackerState::Idle;
            self.last_info = None;
            self.pending_info_queries = 0;
            if self.group.take().is_some() {
                info!("group lost on disconnect");
                actions.push(TrackerAction::Notify(Notification::GroupLost));
            }
            self.set_connection(ConnectionState::Disconnected, &mut actions);
            return actions;
        }

        self.pending_info_queries += 1;
        actions.push(TrackerAction::RequestConnectionInfo);
        if connected {
            if self.group.is_none() {
                self.state = TrackerState::ConnectedNoGroup;
            }
            self.set_connection(ConnectionState::Connected, &mut actions);
        } else if self.connection == ConnectionState::Connected {
            debug!("connecting reported while connected; stale, keeping connected");
        } else {
            if self.group.is_none() {
                self.state = TrackerState::Connecting;
            }
            self.set_connection(ConnectionState::Connecting, &mut actions);
        }
        actions
    }

    pub fn on_device_changed(&mut self) -> Vec<TrackerAction> {
        if self.state == TrackerState::Idle {
            self.state = TrackerState::AwaitingConnectionInfo;
        }
        self.pending_info_queries += 1;
        vec![TrackerAction::RequestConnectionInfo]
    }

    pub fn on_connection_info(&mut self, info: ConnectionInfo) -> Vec<TrackerAction> {
        if self.pending_info_queries == 0 {
            debug!(?info, "connection info without an outstanding query; ignoring");
            return Vec::new();
        }
        self.pending_info_queries -= 1;
        self.last_info = Some(info);

        let mut actions = Vec::new();
        if self.state == TrackerState::AwaitingConnectionInfo {
            if info.group_formed {
                // Connected before we were listening.
                self.state = TrackerState::ConnectedNoGroup;
                self.set_connection(ConnectionState::Connected, &mut actions);
            } else {
                self.state = TrackerState::Idle;
            }
        }
        if info.group_formed {
            actions.push(TrackerAction::RequestGroupInfo);
        }
        actions
    }

    pub fn on_group_info(&mut self, details: Option<GroupDetails>) -> Vec<TrackerAction> {
        let formed_info = self.last_info.filter(|i| i.group_formed);
        match (details, formed_info) {
            (Some(details), Some(info)) => {
                if self.group.is_some() {
                    debug!("group already tracked; ignoring duplicate group info");
                    return Vec::new();
                }
                if self.connection == ConnectionState::Disconnected {
                    debug!("group info while disconnected; stale, ignoring");
                    return Vec::new();
                }
                let owner_ip = info
                    .group_owner_ip
                    .unwrap_or_else(|| IpAddr::V6(details.owner_address.link_local_ipv6()));
                let group = Group {
                    is_owner: info.is_group_owner,
                    owner_address: details.owner_address,
                    interface_name: details.interface_name,
                    owner_ip,
                };
                info!(
                    is_owner = group.is_owner,
                    owner = %group.owner_address,
                    interface = %group.interface_name,
                    %owner_ip,
                    "group joined"
                );
                self.group = Some(group.clone());
                self.state = TrackerState::ConnectedWithGroup;
                vec![TrackerAction::Notify(Notification::GroupJoined(group))]
            }
            _ => {
                if self.group.take().is_none() {
                    return Vec::new();
                }
                info!("group lost");
                self.state = match self.connection {
                    ConnectionState::Connected => TrackerState::ConnectedNoGroup,
                    ConnectionState::Connecting => TrackerState::Connecting,
                    ConnectionState::Disconnected => TrackerState::Idle,
                };
                vec![TrackerAction::Notify(Notification::GroupLost)]
            }
        }
    }

    /// Forget everything without notifying. Used on finalize.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replies to queries issued on a lost channel never arrive; stop waiting for them.
    /// Connection state and group are kept.
    pub fn on_channel_lost(&mut self) {
        if self.pending_info_queries > 0 {
            debug!(
                dropped = self.pending_info_queries,
                "channel lost; dropping outstanding info queries"
            );
        }
        self.pending_info_queries = 0;
        if self.state == TrackerState::AwaitingConnectionInfo {
            self.state = TrackerState::Idle;
        }
    }

    /// A connection-info query could not be issued; stop waiting for its reply.
    pub fn connection_info_abandoned(&mut self) {
        self.pending_info_queries = self.pending_info_queries.saturating_sub(1);
        if self.pending_info_queries == 0 && self.state == TrackerState::AwaitingConnectionInfo {
            self.state = TrackerState::Idle;
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    fn set_connection(&mut self, next: ConnectionState, actions: &mut Vec<TrackerAction>) {
        if self.connection == next {
            return;
        }
        debug!(from = ?self.connection, to = ?next, "connection state");
        self.connection = next;
        actions.push(TrackerAction::Notify(Notification::ConnectionStateChanged(
            next,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MacAddress;
    use std::net::Ipv4Addr;

    const OWNER: [u8; 6] = [0x02, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa];

    fn details() -> GroupDetails {
        GroupDetails {
            owner_address: MacAddress::new(OWNER),
            interface_name: "p2p-wlan0-0".into(),
        }
    }

    fn info(formed: bool, owner: bool) -> ConnectionInfo {
        ConnectionInfo {
            group_formed: formed,
            is_group_owner: owner,
            group_owner_ip: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 49, 1))),
        }
    }

    fn notifications(actions: &[TrackerAction]) -> Vec<Notification> {
        actions
            .iter()
            .filter_map(|a| match a {
                TrackerAction::Notify(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    fn joined(tracker: &mut GroupTracker) {
        tracker.on_connection_changed(true, true);
        tracker.on_connection_info(info(true, true));
        tracker.on_group_info(Some(details()));
    }

    #[test]
    fn connect_query_join_once() {
        let mut t = GroupTracker::new();
        let actions = t.on_connection_changed(true, true);
        assert_eq!(
            actions,
            vec![
                TrackerAction::RequestConnectionInfo,
                TrackerAction::Notify(Notification::ConnectionStateChanged(
                    ConnectionState::Connected
                )),
            ]
        );
        assert_eq!(t.state(), TrackerState::ConnectedNoGroup);

        assert_eq!(
            t.on_connection_info(info(true, true)),
            vec![TrackerAction::RequestGroupInfo]
        );

        let n = notifications(&t.on_group_info(Some(details())));
        assert_eq!(n.len(), 1);
        match &n[0] {
            Notification::GroupJoined(g) => {
                assert!(g.is_owner);
                assert_eq!(g.owner_address, MacAddress::new(OWNER));
                assert_eq!(g.interface_name, "p2p-wlan0-0");
                assert_eq!(g.owner_ip, IpAddr::V4(Ipv4Addr::new(192, 168, 49, 1)));
            }
            other => panic!("expected GroupJoined, got {other:?}"),
        }
        assert_eq!(t.state(), TrackerState::ConnectedWithGroup);

        // Duplicate group info: nothing.
        assert!(t.on_group_info(Some(details())).is_empty());
    }

    #[test]
    fn disconnect_with_group_loses_then_disconnects() {
        let mut t = GroupTracker::new();
        joined(&mut t);
        let n = notifications(&t.on_connection_changed(false, false));
        assert_eq!(
            n,
            vec![
                Notification::GroupLost,
                Notification::ConnectionStateChanged(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(t.state(), TrackerState::Idle);
        assert!(t.group().is_none());

        // Repeated disconnect: nothing.
        assert!(t.on_connection_changed(false, false).is_empty());
    }

    #[test]
    fn connecting_then_connected() {
        let mut t = GroupTracker::new();
        let n = notifications(&t.on_connection_changed(true, false));
        assert_eq!(
            n,
            vec![Notification::ConnectionStateChanged(ConnectionState::Connecting)]
        );
        assert_eq!(t.state(), TrackerState::Connecting);
        let n = notifications(&t.on_connection_changed(true, true));
        assert_eq!(
            n,
            vec![Notification::ConnectionStateChanged(ConnectionState::Connected)]
        );
        // Duplicate connected: no repeated state notification.
        assert!(notifications(&t.on_connection_changed(true, true)).is_empty());
    }

    #[test]
    fn stale_connecting_after_connected_is_ignored() {
        let mut t = GroupTracker::new();
        t.on_connection_changed(true, true);
        let actions = t.on_connection_changed(true, false);
        assert!(notifications(&actions).is_empty());
        assert_eq!(t.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn group_lost_via_group_info_none() {
        let mut t = GroupTracker::new();
        joined(&mut t);
        assert_eq!(notifications(&t.on_group_info(None)), vec![Notification::GroupLost]);
        assert_eq!(t.state(), TrackerState::ConnectedNoGroup);
        assert!(t.on_group_info(None).is_empty());
    }

    #[test]
    fn group_info_none_without_group_is_noop() {
        let mut t = GroupTracker::new();
        assert!(t.on_group_info(None).is_empty());
        t.on_connection_changed(true, true);
        assert!(t.on_group_info(None).is_empty());
    }

    #[test]
    fn group_not_formed_per_last_info_counts_as_lost() {
        let mut t = GroupTracker::new();
        joined(&mut t);
        t.on_connection_changed(true, true);
        assert!(t.on_connection_info(info(false, false)).is_empty());
        // Platform still hands back a group object; last info says not formed.
        assert_eq!(
            notifications(&t.on_group_info(Some(details()))),
            vec![Notification::GroupLost]
        );
    }

    #[test]
    fn connection_info_not_formed_requests_nothing() {
        let mut t = GroupTracker::new();
        t.on_connection_changed(true, false);
        assert!(t.on_connection_info(info(false, false)).is_empty());
    }

    #[test]
    fn unsolicited_connection_info_is_ignored() {
        let mut t = GroupTracker::new();
        assert!(t.on_connection_info(info(true, true)).is_empty());
        t.on_connection_changed(true, true);
        assert_eq!(t.on_connection_info(info(true, true)).len(), 1);
        // One query, one reply; the second reply is stale.
        assert!(t.on_connection_info(info(true, true)).is_empty());
    }

    #[test]
    fn stale_replies_after_disconnect_are_ignored() {
        let mut t = GroupTracker::new();
        t.on_connection_changed(true, true);
        t.on_connection_changed(false, false);
        assert!(t.on_connection_info(info(true, true)).is_empty());
        assert!(t.on_group_info(Some(details())).is_empty());
        assert!(t.group().is_none());
    }

    #[test]
    fn device_changed_discovers_existing_group() {
        let mut t = GroupTracker::new();
        assert_eq!(t.on_device_changed(), vec![TrackerAction::RequestConnectionInfo]);
        assert_eq!(t.state(), TrackerState::AwaitingConnectionInfo);
        let actions = t.on_connection_info(info(true, false));
        assert_eq!(
            actions,
            vec![
                TrackerAction::Notify(Notification::ConnectionStateChanged(
                    ConnectionState::Connected
                )),
                TrackerAction::RequestGroupInfo,
            ]
        );
        let n = notifications(&t.on_group_info(Some(details())));
        assert!(matches!(&n[..], [Notification::GroupJoined(g)] if !g.is_owner));
    }

    #[test]
    fn device_changed_without_group_returns_to_idle() {
        let mut t = GroupTracker::new();
        t.on_device_changed();
        assert!(t.on_connection_info(info(false, false)).is_empty());
        assert_eq!(t.state(), TrackerState::Idle);
        assert_eq!(t.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn abandoned_query_leaves_awaiting_state() {
        let mut t = GroupTracker::new();
        t.on_device_changed();
        t.connection_info_abandoned();
        assert_eq!(t.state(), TrackerState::Idle);
        assert!(t.on_connection_info(info(true, true)).is_empty());
    }

    #[test]
    fn owner_ip_falls_back_to_link_local() {
        let mut t = GroupTracker::new();
        t.on_connection_changed(true, true);
        t.on_connection_info(ConnectionInfo {
            group_formed: true,
            is_group_owner: false,
            group_owner_ip: None,
        });
        t.on_group_info(Some(details()));
        let expected = IpAddr::V6(MacAddress::new(OWNER).link_local_ipv6());
        assert_eq!(t.group().map(|g| g.owner_ip), Some(expected));
    }

    #[test]
    fn new_episode_after_loss_joins_again() {
        let mut t = GroupTracker::new();
        joined(&mut t);
        t.on_connection_changed(false, false);
        t.on_connection_changed(true, true);
        t.on_connection_info(info(true, false));
        let n = notifications(&t.on_group_info(Some(details())));
        assert_eq!(n.len(), 1);
        assert!(matches!(n[0], Notification::GroupJoined(_)));
    }

    #[test]
    fn channel_loss_forgets_outstanding_queries() {
        let mut t = GroupTracker::new();
        t.on_connection_changed(true, true);
        t.on_channel_lost();
        assert_eq!(t.connection_state(), ConnectionState::Connected);
        // The reply to the lost query is no longer expected.
        assert!(t.on_connection_info(info(true, true)).is_empty());

        let mut t = GroupTracker::new();
        t.on_device_changed();
        assert_eq!(t.state(), TrackerState::AwaitingConnectionInfo);
        t.on_channel_lost();
        assert_eq!(t.state(), TrackerState::Idle);
    }

    /// Tiny deterministic generator so the sequence test needs no extra crates.
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn arbitrary_event_sequences_keep_joined_lost_paired() {
        for seed in 1..200u64 {
            let mut rng = XorShift(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            let mut t = GroupTracker::new();
            let mut in_group = false;
            for _ in 0..60 {
                let event = match rng.next() % 9 {
                    0 => TrackerEvent::ConnectionChanged {
                        connected_or_connecting: false,
                        connected: false,
                    },
                    1 => TrackerEvent::ConnectionChanged {
                        connected_or_connecting: true,
                        connected: false,
                    },
                    2 => TrackerEvent::ConnectionChanged {
                        connected_or_connecting: true,
                        connected: true,
                    },
                    3 => TrackerEvent::DeviceChanged,
                    4 => TrackerEvent::ConnectionInfo(info(rng.next() % 3 != 0, true)),
                    5 => TrackerEvent::GroupInfo(None),
                    6 => TrackerEvent::GroupInfo(Some(details())),
                    _ => {
                        t.on_channel_lost();
                        continue;
                    }
                };
                for n in notifications(&t.handle(event)) {
                    match n {
                        Notification::GroupJoined(_) => {
                            assert!(!in_group, "seed {seed}: joined twice in one episode");
                            in_group = true;
                        }
                        Notification::GroupLost => {
                            assert!(in_group, "seed {seed}: lost without joined");
                            in_group = false;
                        }
                        _ => {}
                    }
                }
                assert_eq!(t.group().is_some(), in_group);
                if t.group().is_some() {
                    assert_ne!(t.connection_state(), ConnectionState::Disconnected);
                    assert_eq!(t.state(), TrackerState::ConnectedWithGroup);
                }
            }
        }
    }
}
