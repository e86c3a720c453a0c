//! Session orchestrator. Host-driven: the host feeds platform events and promise resolutions,
//! the session drives the platform and notifies the observer.
//!
//! Single-threaded: every entry point must run on the thread that owns the platform's event
//! loop. `Session` holds non-`Send` callbacks, so the compiler enforces this for Rust hosts;
//! C hosts must honor it themselves.

use std::collections::VecDeque;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::address::MacAddress;
use crate::channel::ChannelManager;
use crate::config::{ConfigError, SessionConfig};
use crate::dispatcher::{self, PlatformEvent, Route, SessionSignal};
use crate::error::SessionError;
use crate::platform::{ChannelHandle, ConnectConfig, IpProvisioning, PlatformService};
use crate::process;
use crate::promise::{reason, Completion, Outcome, PromiseBridge, PromiseId, PromiseStats};
use crate::registry::PeerRegistry;
use crate::tracker::{GroupTracker, TrackerAction, TrackerState};
use crate::types::{ConnectionState, DeviceIdentity, Group, Notification, Peer};

/// Receives derived session events. Stands in for the native counterpart of the session.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver {
    /// Device identity known; the session now accepts commands directly.
    fn on_ready(&mut self, _identity: &DeviceIdentity) {}

    fn on_roster_changed(&mut self, roster: &[Peer]);

    fn on_connection_state_changed(&mut self, state: ConnectionState);

    fn on_group_joined(&mut self, group: &Group);

    fn on_group_lost(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Started,
    AlreadyInitialized,
}

/// How a command was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Issued(PromiseId),
    /// Held until the device identity is known; `position` commands are ahead of it.
    Queued { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTicket {
    pub dispatch: Dispatch,
    /// `PlatformDefault` when IPv6 link-local provisioning could not be requested.
    pub provisioning: IpProvisioning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lifecycle {
    Created,
    AwaitingDevice,
    Ready(DeviceIdentity),
    Finalized,
}

#[derive(Debug)]
enum QueuedCommand {
    Discover(Completion),
    Connect(ConnectConfig, Completion),
}

impl QueuedCommand {
    fn into_completion(self) -> Completion {
        match self {
            QueuedCommand::Discover(c) | QueuedCommand::Connect(_, c) => c,
        }
    }
}

pub struct Session<P: PlatformService> {
    id: Uuid,
    config: SessionConfig,
    platform: P,
    observer: Box<dyn SessionObserver>,
    channel: ChannelManager,
    registry: PeerRegistry,
    tracker: GroupTracker,
    promises: PromiseBridge,
    lifecycle: Lifecycle,
    listening: bool,
    queue: VecDeque<QueuedCommand>,
    connect_in_flight: Option<PromiseId>,
    /// Whether the observer has seen group-joined for the current group.
    group_announced: bool,
}

impl<P: PlatformService> Session<P> {
    /// Fails if `config` does not validate.
    pub fn new(
        config: SessionConfig,
        platform: P,
        observer: Box<dyn SessionObserver>,
    ) -> Result<Self, ConfigError> {
        process::init();
        config.validate()?;
        let id = Uuid::new_v4();
        debug!(session = %id, ?config, "session created");
        Ok(Self {
            id,
            config,
            platform,
            observer,
            channel: ChannelManager::new(),
            registry: PeerRegistry::new(),
            tracker: GroupTracker::new(),
            promises: PromiseBridge::new(),
            lifecycle: Lifecycle::Created,
            listening: false,
            queue: VecDeque::new(),
            connect_in_flight: None,
            group_announced: false,
        })
    }

    /// Acquire the channel, start listening, and ask for the device identity.
    pub fn init(&mut self) -> Result<InitOutcome, SessionError> {
        match self.lifecycle {
            Lifecycle::Finalized => return Err(SessionError::Finalized),
            Lifecycle::Created => {}
            Lifecycle::AwaitingDevice | Lifecycle::Ready(_) => {
                debug!(session = %self.id, "init: already initialized");
                return Ok(InitOutcome::AlreadyInitialized);
            }
        }
        let channel = self.channel.ensure_channel(&mut self.platform)?;
        self.start_listening();
        self.platform.request_device_info(channel);
        self.lifecycle = Lifecycle::AwaitingDevice;
        info!(session = %self.id, %channel, "session initializing");
        Ok(InitOutcome::Started)
    }

    pub fn discover_peers(&mut self, completion: Completion) -> Result<Dispatch, SessionError> {
        self.check_usable()?;
        if !self.is_ready() {
            return self.enqueue(QueuedCommand::Discover(completion));
        }
        let channel = self.channel.ensure_channel(&mut self.platform)?;
        Ok(Dispatch::Issued(self.send_discover(channel, completion)))
    }

    /// Connect to a peer. Rejected with `OperationInProgress` while another connect is queued
    /// or awaiting its result.
    pub fn connect_to_peer(
        &mut self,
        address: MacAddress,
        completion: Completion,
    ) -> Result<ConnectTicket, SessionError> {
        self.check_usable()?;
        if self.connect_pending() {
            return Err(SessionError::OperationInProgress);
        }
        if self.is_ready() && self.registry.get(&address).is_none() {
            debug!(%address, "connecting to a device not in the roster");
        }
        let config = self.connect_config(address);
        let provisioning = config.provisioning;
        let dispatch = if self.is_ready() {
            let channel = self.channel.ensure_channel(&mut self.platform)?;
            Dispatch::Issued(self.send_connect(channel, &config, completion))
        } else {
            self.enqueue(QueuedCommand::Connect(config, completion))?
        };
        Ok(ConnectTicket {
            dispatch,
            provisioning,
        })
    }

    /// Stop receiving platform broadcasts. Roster and connection state are kept.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.check_usable()?;
        if self.listening {
            self.platform.unregister_receiver();
            self.listening = false;
            debug!(session = %self.id, "paused");
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.check_usable()?;
        self.start_listening();
        Ok(())
    }

    /// Tear the session down. Outstanding and queued commands complete as aborted.
    /// Returns false if it was already finalized.
    pub fn finalize(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Finalized {
            return false;
        }
        if self.listening {
            self.platform.unregister_receiver();
            self.listening = false;
        }
        let queued = self.queue.len();
        for command in self.queue.drain(..) {
            command.into_completion().complete(Outcome::aborted());
        }
        let aborted = self.promises.abort_all();
        self.channel.release();
        self.registry.clear();
        self.tracker.reset();
        self.connect_in_flight = None;
        self.group_announced = false;
        self.lifecycle = Lifecycle::Finalized;
        info!(session = %self.id, queued, aborted, "session finalized");
        true
    }

    /// Platform callback for a command issued with `promise`. First resolution wins.
    pub fn resolve_promise(&mut self, promise: PromiseId, success: bool, reason: i32) -> bool {
        let resolved = self.promises.resolve(promise, Outcome { success, reason });
        if resolved && self.connect_in_flight == Some(promise) {
            self.connect_in_flight = None;
        }
        resolved
    }

    pub fn handle_event(&mut self, event: PlatformEvent) {
        if self.lifecycle == Lifecycle::Finalized {
            debug!(?event, "event after finalize; dropped");
            return;
        }
        if event.is_broadcast() && !self.listening {
            debug!(?event, "broadcast while not listening; dropped");
            return;
        }
        match dispatcher::route(event) {
            Route::Registry(peers) => self.on_peer_list(peers),
            Route::Tracker(event) => {
                let actions = self.tracker.handle(event);
                self.apply(actions);
            }
            Route::ChannelLost => {
                self.channel.on_channel_lost();
                self.tracker.on_channel_lost();
            }
            Route::Session(SessionSignal::RadioState(enabled)) => {
                info!(session = %self.id, enabled, "P2P radio state changed");
            }
            Route::Session(SessionSignal::RefreshPeers) => {
                if let Some(channel) = self.channel_for("peer list") {
                    self.platform.request_peer_list(channel);
                }
            }
            Route::Session(SessionSignal::DeviceInfo(device)) => self.on_device_info(device),
            Route::Dropped => {}
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn roster(&self) -> &[Peer] {
        self.registry.roster()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.tracker.connection_state()
    }

    pub fn group(&self) -> Option<&Group> {
        self.tracker.group()
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.tracker.state()
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        match &self.lifecycle {
            Lifecycle::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready(_))
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_finalized(&self) -> bool {
        self.lifecycle == Lifecycle::Finalized
    }

    pub fn queued_commands(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding_promises(&self) -> usize {
        self.promises.outstanding()
    }

    pub fn promise_stats(&self) -> PromiseStats {
        self.promises.stats()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn check_usable(&self) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Finalized => Err(SessionError::Finalized),
            Lifecycle::Created => Err(SessionError::NotInitialized),
            Lifecycle::AwaitingDevice | Lifecycle::Ready(_) => Ok(()),
        }
    }

    fn start_listening(&mut self) {
        if !self.listening {
            self.platform.register_receiver();
            self.listening = true;
            debug!(session = %self.id, "listening for platform broadcasts");
        }
    }

    fn connect_pending(&self) -> bool {
        self.connect_in_flight
            .is_some_and(|id| self.promises.is_pending(id))
            || self
                .queue
                .iter()
                .any(|c| matches!(c, QueuedCommand::Connect(..)))
    }

    fn connect_config(&self, address: MacAddress) -> ConnectConfig {
        let provisioning = if !self.config.request_ipv6_link_local {
            IpProvisioning::PlatformDefault
        } else if self.platform.supports_ipv6_link_local() {
            IpProvisioning::Ipv6LinkLocal
        } else {
            warn!(%address, "client IP provisioning might not use IPv6 link-local addressing");
            IpProvisioning::PlatformDefault
        };
        ConnectConfig {
            device_address: address,
            group_owner_intent: self.config.group_owner_intent,
            provisioning,
        }
    }

    fn enqueue(&mut self, command: QueuedCommand) -> Result<Dispatch, SessionError> {
        let capacity = self.config.command_queue_capacity;
        if self.queue.len() >= capacity {
            warn!(session = %self.id, capacity, "command queue full; rejecting");
            return Err(SessionError::QueueFull { capacity });
        }
        let position = self.queue.len();
        debug!(session = %self.id, ?command, position, "queued until device identity is known");
        self.queue.push_back(command);
        Ok(Dispatch::Queued { position })
    }

    fn send_discover(&mut self, channel: ChannelHandle, completion: Completion) -> PromiseId {
        let promise = self.promises.create(completion);
        debug!(session = %self.id, promise = %promise.id, "discover peers");
        self.platform.discover_peers(channel, promise.id);
        promise.id
    }

    fn send_connect(
        &mut self,
        channel: ChannelHandle,
        config: &ConnectConfig,
        completion: Completion,
    ) -> PromiseId {
        let promise = self.promises.create(completion);
        info!(
            session = %self.id,
            promise = %promise.id,
            peer = %config.device_address,
            provisioning = ?config.provisioning,
            "connect"
        );
        self.platform.connect(channel, config, promise.id);
        self.connect_in_flight = Some(promise.id);
        promise.id
    }

    fn flush_queue(&mut self) {
        while let Some(command) = self.queue.pop_front() {
            let channel = match self.channel.ensure_channel(&mut self.platform) {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(session = %self.id, error = %e, "queued command failed: no channel");
                    command
                        .into_completion()
                        .complete(Outcome::failure(reason::CHANNEL_UNAVAILABLE));
                    continue;
                }
            };
            match command {
                QueuedCommand::Discover(completion) => {
                    self.send_discover(channel, completion);
                }
                QueuedCommand::Connect(config, completion) => {
                    self.send_connect(channel, &config, completion);
                }
            }
        }
    }

    fn channel_for(&mut self, what: &str) -> Option<ChannelHandle> {
        match self.channel.ensure_channel(&mut self.platform) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(session = %self.id, error = %e, "cannot request {what}");
                None
            }
        }
    }

    fn apply(&mut self, actions: Vec<TrackerAction>) {
        for action in actions {
            match action {
                TrackerAction::Notify(notification) => self.notify(notification),
                TrackerAction::RequestConnectionInfo => match self.channel_for("connection info") {
                    Some(channel) => self.platform.request_connection_info(channel),
                    None => self.tracker.connection_info_abandoned(),
                },
                TrackerAction::RequestGroupInfo => {
                    if let Some(channel) = self.channel_for("group info") {
                        self.platform.request_group_info(channel);
                    }
                }
            }
        }
    }

    /// Roster and group notifications need the counterpart, which exists once the device
    /// identity is known. Anything held back is replayed as a snapshot at that point.
    fn notify(&mut self, notification: Notification) {
        let ready = self.is_ready();
        match notification {
            Notification::ConnectionStateChanged(state) => {
                self.observer.on_connection_state_changed(state);
            }
            Notification::RosterChanged(roster) => {
                if ready {
                    self.observer.on_roster_changed(&roster);
                }
            }
            Notification::GroupJoined(group) => {
                if ready {
                    self.observer.on_group_joined(&group);
                    self.group_announced = true;
                }
            }
            Notification::GroupLost => {
                if self.group_announced {
                    self.observer.on_group_lost();
                    self.group_announced = false;
                }
            }
        }
    }

    fn on_peer_list(&mut self, peers: Vec<Peer>) {
        let ready = self.is_ready();
        if let Some(roster) = self.registry.update_from_platform_list(peers) {
            info!(session = %self.id, peers = roster.len(), "roster changed");
            if ready {
                self.observer.on_roster_changed(roster);
            }
        }
    }

    fn on_device_info(&mut self, device: Option<DeviceIdentity>) {
        let Some(identity) = device else {
            warn!(session = %self.id, "device info reply without a device; still waiting");
            return;
        };
        match self.lifecycle {
            Lifecycle::AwaitingDevice => {}
            Lifecycle::Ready(_) => {
                debug!(session = %self.id, name = %identity.name, "device identity updated");
                self.lifecycle = Lifecycle::Ready(identity);
                return;
            }
            Lifecycle::Created | Lifecycle::Finalized => {
                debug!(session = %self.id, "device info outside init; ignoring");
                return;
            }
        }
        info!(session = %self.id, name = %identity.name, "device identity established");
        self.lifecycle = Lifecycle::Ready(identity.clone());
        self.observer.on_ready(&identity);
        if !self.registry.is_empty() {
            self.observer.on_roster_changed(self.registry.roster());
        }
        if let Some(group) = self.tracker.group() {
            self.observer.on_group_joined(group);
            self.group_announced = true;
        }
        self.flush_queue();
    }
}

impl<P: PlatformService> Drop for Session<P> {
    fn drop(&mut self) {
        self.finalize();
    }
}
