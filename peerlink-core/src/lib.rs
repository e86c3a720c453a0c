//! PeerLink: Wi-Fi Direct style P2P session state machine.
//! Host-driven: no I/O; the host supplies a platform service, pushes platform events in, and
//! receives observer notifications and command completions.

pub mod address;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ffi;
pub mod platform;
pub mod process;
pub mod promise;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod types;

pub use address::{AddressParseError, MacAddress};
pub use config::{ConfigError, SessionConfig};
pub use dispatcher::PlatformEvent;
pub use error::SessionError;
pub use platform::{ChannelHandle, ConnectConfig, IpProvisioning, PlatformError, PlatformService};
pub use promise::{Completion, Outcome, PromiseId, PromiseStats};
pub use session::{ConnectTicket, Dispatch, InitOutcome, Session, SessionObserver};
pub use types::{
    ConnectionInfo, ConnectionState, DeviceIdentity, Group, GroupDetails, Notification, Peer,
};
