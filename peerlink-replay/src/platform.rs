//! In-memory platform: records every request the session makes instead of talking to a radio.

use std::cell::RefCell;
use std::rc::Rc;

use peerlink_core::{ChannelHandle, ConnectConfig, PlatformError, PlatformService, PromiseId};
use serde::Serialize;

use crate::replay::Output;

/// A request the session made of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Issued {
    InitializeChannel { channel: Option<ChannelHandle> },
    RegisterReceiver,
    UnregisterReceiver,
    RequestDeviceInfo { channel: ChannelHandle },
    RequestConnectionInfo { channel: ChannelHandle },
    RequestGroupInfo { channel: ChannelHandle },
    RequestPeerList { channel: ChannelHandle },
    DiscoverPeers { channel: ChannelHandle, promise: PromiseId },
    Connect {
        channel: ChannelHandle,
        config: ConnectConfig,
        promise: PromiseId,
    },
}

pub struct ScriptedPlatform {
    out: Rc<RefCell<Vec<Output>>>,
    next_channel: u64,
    /// `Some` while channel creation should fail; the inner value is the failure reason.
    channel_failure: Option<Option<String>>,
    ipv6_link_local: bool,
    last_promise: Option<PromiseId>,
}

impl ScriptedPlatform {
    pub fn new(out: Rc<RefCell<Vec<Output>>>, ipv6_link_local: bool) -> Self {
        Self {
            out,
            next_channel: 1,
            channel_failure: None,
            ipv6_link_local,
            last_promise: None,
        }
    }

    pub fn set_channel_available(&mut self, available: bool, error: Option<String>) {
        self.channel_failure = if available { None } else { Some(error) };
    }

    /// Promise of the most recent discover or connect request.
    pub fn last_promise(&self) -> Option<PromiseId> {
        self.last_promise
    }

    fn record(&self, issued: Issued) {
        self.out.borrow_mut().push(Output::Issued(issued));
    }
}

impl PlatformService for ScriptedPlatform {
    fn initialize_channel(&mut self) -> Result<ChannelHandle, PlatformError> {
        if let Some(reason) = &self.channel_failure {
            self.record(Issued::InitializeChannel { channel: None });
            return Err(match reason {
                Some(reason) => PlatformError::ChannelInit(reason.clone()),
                None => PlatformError::Unavailable,
            });
        }
        let channel = ChannelHandle(self.next_channel);
        self.next_channel += 1;
        self.record(Issued::InitializeChannel {
            channel: Some(channel),
        });
        Ok(channel)
    }

    fn register_receiver(&mut self) {
        self.record(Issued::RegisterReceiver);
    }

    fn unregister_receiver(&mut self) {
        self.record(Issued::UnregisterReceiver);
    }

    fn request_device_info(&mut self, channel: ChannelHandle) {
        self.record(Issued::RequestDeviceInfo { channel });
    }

    fn request_connection_info(&mut self, channel: ChannelHandle) {
        self.record(Issued::RequestConnectionInfo { channel });
    }

    fn request_group_info(&mut self, channel: ChannelHandle) {
        self.record(Issued::RequestGroupInfo { channel });
    }

    fn request_peer_list(&mut self, channel: ChannelHandle) {
        self.record(Issued::RequestPeerList { channel });
    }

    fn discover_peers(&mut self, channel: ChannelHandle, promise: PromiseId) {
        self.last_promise = Some(promise);
        self.record(Issued::DiscoverPeers { channel, promise });
    }

    fn connect(&mut self, channel: ChannelHandle, config: &ConnectConfig, promise: PromiseId) {
        self.last_promise = Some(promise);
        self.record(Issued::Connect {
            channel,
            config: config.clone(),
            promise,
        });
    }

    fn supports_ipv6_link_local(&self) -> bool {
        self.ipv6_link_local
    }
}
