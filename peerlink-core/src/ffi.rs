//! C ABI for linking peerlink-core as a static library from Android (NDK) or other C/C++ hosts.
//! The host hands in two callback tables: platform operations and observer notifications.
//! Platform events and promise resolutions come back in through the `peerlink_on_*` functions.
//! All calls for one session must happen on the same thread.
//!
//! Callbacks run while the session is busy. A `peerlink_*` call on the same handle from inside
//! any callback returns `REENTRANT` and has no effect; post the work to the host's event loop
//! instead. `peerlink_session_destroy` must never be called from inside a callback.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::net::IpAddr;
use std::os::raw::{c_char, c_int};
use std::slice;

use tracing::warn;

use crate::address::MacAddress;
use crate::config::SessionConfig;
use crate::dispatcher::PlatformEvent;
use crate::platform::{ChannelHandle, ConnectConfig, IpProvisioning, PlatformError, PlatformService};
use crate::promise::{Completion, PromiseId};
use crate::session::{Dispatch, InitOutcome, Session, SessionObserver};
use crate::types::{ConnectionInfo, ConnectionState, DeviceIdentity, Group, GroupDetails, Peer};
use crate::{process, SessionError};

const BAD_ARGUMENT: c_int = -1;
/// Returned when a call arrives from inside one of this session's callbacks.
pub const REENTRANT: c_int = -7;

/// Platform operations implemented by the host. `ctx` is passed back verbatim.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PlatformCallbacks {
    pub ctx: *mut c_void,
    /// Returns a non-zero channel handle, or 0 if the P2P service is unavailable.
    pub initialize_channel: extern "C" fn(ctx: *mut c_void) -> u64,
    pub register_receiver: extern "C" fn(ctx: *mut c_void),
    pub unregister_receiver: extern "C" fn(ctx: *mut c_void),
    pub request_device_info: extern "C" fn(ctx: *mut c_void, channel: u64),
    pub request_connection_info: extern "C" fn(ctx: *mut c_void, channel: u64),
    pub request_group_info: extern "C" fn(ctx: *mut c_void, channel: u64),
    pub request_peer_list: extern "C" fn(ctx: *mut c_void, channel: u64),
    /// Resolve with `peerlink_promise_resolve(promise, ...)`.
    pub discover_peers: extern "C" fn(ctx: *mut c_void, channel: u64, promise: u64),
    /// `group_owner_intent` is -1 when unset.
    pub connect: extern "C" fn(
        ctx: *mut c_void,
        channel: u64,
        device_address: *const c_char,
        ipv6_link_local: bool,
        group_owner_intent: c_int,
        promise: u64,
    ),
    pub supports_ipv6_link_local: bool,
}

/// Notifications delivered to the host. Strings are only valid for the duration of the call.
/// None of these may call back into the session; such calls get `REENTRANT`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ObserverCallbacks {
    pub ctx: *mut c_void,
    /// `address` is null when the platform did not report one.
    pub on_ready: extern "C" fn(ctx: *mut c_void, name: *const c_char, address: *const c_char),
    pub on_roster_changed: extern "C" fn(
        ctx: *mut c_void,
        names: *const *const c_char,
        addresses: *const *const c_char,
        count: usize,
    ),
    /// 0 disconnected, 1 connecting, 2 connected.
    pub on_connection_state_changed: extern "C" fn(ctx: *mut c_void, state: c_int),
    pub on_group_joined: extern "C" fn(
        ctx: *mut c_void,
        is_owner: bool,
        owner_address: *const c_char,
        interface_name: *const c_char,
        owner_ip: *const c_char,
    ),
    pub on_group_lost: extern "C" fn(ctx: *mut c_void),
    /// Result of a discover or connect call, identified by the caller's tag.
    pub on_completion: extern "C" fn(ctx: *mut c_void, tag: u64, success: bool, reason: c_int),
}

pub struct FfiPlatform {
    callbacks: PlatformCallbacks,
}

impl PlatformService for FfiPlatform {
    fn initialize_channel(&mut self) -> Result<ChannelHandle, PlatformError> {
        match (self.callbacks.initialize_channel)(self.callbacks.ctx) {
            0 => Err(PlatformError::Unavailable),
            handle => Ok(ChannelHandle(handle)),
        }
    }

    fn register_receiver(&mut self) {
        (self.callbacks.register_receiver)(self.callbacks.ctx)
    }

    fn unregister_receiver(&mut self) {
        (self.callbacks.unregister_receiver)(self.callbacks.ctx)
    }

    fn request_device_info(&mut self, channel: ChannelHandle) {
        (self.callbacks.request_device_info)(self.callbacks.ctx, channel.0)
    }

    fn request_connection_info(&mut self, channel: ChannelHandle) {
        (self.callbacks.request_connection_info)(self.callbacks.ctx, channel.0)
    }

    fn request_group_info(&mut self, channel: ChannelHandle) {
        (self.callbacks.request_group_info)(self.callbacks.ctx, channel.0)
    }

    fn request_peer_list(&mut self, channel: ChannelHandle) {
        (self.callbacks.request_peer_list)(self.callbacks.ctx, channel.0)
    }

    fn discover_peers(&mut self, channel: ChannelHandle, promise: PromiseId) {
        (self.callbacks.discover_peers)(self.callbacks.ctx, channel.0, promise.0)
    }

    fn connect(&mut self, channel: ChannelHandle, config: &ConnectConfig, promise: PromiseId) {
        let address = c_string(&config.device_address.to_string());
        let intent = config.group_owner_intent.map_or(-1, c_int::from);
        (self.callbacks.connect)(
            self.callbacks.ctx,
            channel.0,
            address.as_ptr(),
            config.provisioning == IpProvisioning::Ipv6LinkLocal,
            intent,
            promise.0,
        )
    }

    fn supports_ipv6_link_local(&self) -> bool {
        self.callbacks.supports_ipv6_link_local
    }
}

struct FfiObserver {
    callbacks: ObserverCallbacks,
}

impl SessionObserver for FfiObserver {
    fn on_ready(&mut self, identity: &DeviceIdentity) {
        let name = c_string(&identity.name);
        let address = identity.address.map(|a| c_string(&a.to_string()));
        let address_ptr = address.as_ref().map_or(std::ptr::null(), |a| a.as_ptr());
        (self.callbacks.on_ready)(self.callbacks.ctx, name.as_ptr(), address_ptr)
    }

    fn on_roster_changed(&mut self, roster: &[Peer]) {
        let names: Vec<CString> = roster.iter().map(|p| c_string(&p.name)).collect();
        let addresses: Vec<CString> = roster
            .iter()
            .map(|p| c_string(&p.address.to_string()))
            .collect();
        let name_ptrs: Vec<*const c_char> = names.iter().map(|s| s.as_ptr()).collect();
        let address_ptrs: Vec<*const c_char> = addresses.iter().map(|s| s.as_ptr()).collect();
        (self.callbacks.on_roster_changed)(
            self.callbacks.ctx,
            name_ptrs.as_ptr(),
            address_ptrs.as_ptr(),
            roster.len(),
        )
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        (self.callbacks.on_connection_state_changed)(self.callbacks.ctx, state.as_raw())
    }

    fn on_group_joined(&mut self, group: &Group) {
        let owner = c_string(&group.owner_address.to_string());
        let interface = c_string(&group.interface_name);
        let ip = c_string(&group.owner_ip.to_string());
        (self.callbacks.on_group_joined)(
            self.callbacks.ctx,
            group.is_owner,
            owner.as_ptr(),
            interface.as_ptr(),
            ip.as_ptr(),
        )
    }

    fn on_group_lost(&mut self) {
        (self.callbacks.on_group_lost)(self.callbacks.ctx)
    }
}

type FfiSession = Session<FfiPlatform>;

/// What an opaque handle points at.
struct Handle {
    session: RefCell<FfiSession>,
    observer: ObserverCallbacks,
}

/// Interior NULs can't cross the boundary; drop them.
fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn str_arg<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(p) }.to_str().ok()
}

fn completion_for(observer: &ObserverCallbacks, tag: u64) -> Completion {
    let ctx = observer.ctx;
    let on_completion = observer.on_completion;
    Completion::from_fn(move |outcome| on_completion(ctx, tag, outcome.success, outcome.reason))
}

fn dispatch_code(dispatch: Dispatch) -> c_int {
    match dispatch {
        Dispatch::Issued(_) => 1,
        Dispatch::Queued { .. } => 2,
    }
}

/// Process-scoped setup (logging). Returns true on the first call only.
#[no_mangle]
pub extern "C" fn peerlink_init() -> bool {
    process::init()
}

/// Create a session. `config_toml` may be null for defaults.
/// Returns an opaque handle, or null if a table is missing or the config is invalid.
#[no_mangle]
pub extern "C" fn peerlink_session_create(
    platform: *const PlatformCallbacks,
    observer: *const ObserverCallbacks,
    config_toml: *const c_char,
) -> *mut c_void {
    if platform.is_null() || observer.is_null() {
        return std::ptr::null_mut();
    }
    let config = if config_toml.is_null() {
        SessionConfig::default()
    } else {
        let parsed = str_arg(config_toml)
            .ok_or_else(|| "config is not valid UTF-8".to_string())
            .and_then(|s| SessionConfig::from_toml_str(s).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                process::init();
                warn!(error = %e, "rejecting session config");
                return std::ptr::null_mut();
            }
        }
    };
    let (platform, observer) = unsafe { (*platform, *observer) };
    let created = FfiSession::new(
        config,
        FfiPlatform { callbacks: platform },
        Box::new(FfiObserver {
            callbacks: observer,
        }),
    );
    match created {
        Ok(session) => Box::into_raw(Box::new(Handle {
            session: RefCell::new(session),
            observer,
        })) as *mut c_void,
        Err(e) => {
            warn!(error = %e, "rejecting session config");
            std::ptr::null_mut()
        }
    }
}

/// Destroy a session. Finalizes it first if needed. No-op if h is null.
#[no_mangle]
pub extern "C" fn peerlink_session_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut Handle) };
}

// Shared only: a callback may re-enter while an outer call holds the session borrow.
fn handle_ref<'a>(h: *mut c_void) -> Option<&'a Handle> {
    if h.is_null() {
        return None;
    }
    Some(unsafe { &*(h as *const Handle) })
}

fn with_handle(h: *mut c_void, f: impl FnOnce(&mut FfiSession, &Handle) -> c_int) -> c_int {
    let Some(handle) = handle_ref(h) else {
        return BAD_ARGUMENT;
    };
    let Ok(mut session) = handle.session.try_borrow_mut() else {
        warn!("call from inside a session callback rejected");
        return REENTRANT;
    };
    f(&mut *session, handle)
}

fn with_session(h: *mut c_void, f: impl FnOnce(&mut FfiSession) -> c_int) -> c_int {
    with_handle(h, |session, _| f(session))
}

fn status(result: Result<(), SessionError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// Returns 1 started, 0 already initialized, negative on error.
#[no_mangle]
pub extern "C" fn peerlink_session_init(h: *mut c_void) -> c_int {
    with_session(h, |s| match s.init() {
        Ok(InitOutcome::Started) => 1,
        Ok(InitOutcome::AlreadyInitialized) => 0,
        Err(e) => e.code(),
    })
}

/// Returns 1 if this call finalized the session, 0 if it was already finalized.
#[no_mangle]
pub extern "C" fn peerlink_session_finalize(h: *mut c_void) -> c_int {
    with_session(h, |s| c_int::from(s.finalize()))
}

#[no_mangle]
pub extern "C" fn peerlink_session_pause(h: *mut c_void) -> c_int {
    with_session(h, |s| status(s.pause()))
}

#[no_mangle]
pub extern "C" fn peerlink_session_resume(h: *mut c_void) -> c_int {
    with_session(h, |s| status(s.resume()))
}

/// Start peer discovery; the result arrives via `on_completion(tag, ...)`.
/// Returns 1 issued, 2 queued, negative on error (no completion will follow).
#[no_mangle]
pub extern "C" fn peerlink_session_discover_peers(h: *mut c_void, tag: u64) -> c_int {
    with_handle(h, |session, handle| {
        let completion = completion_for(&handle.observer, tag);
        match session.discover_peers(completion) {
            Ok(dispatch) => dispatch_code(dispatch),
            Err(e) => e.code(),
        }
    })
}

/// Connect to `device_address` ("aa:bb:cc:dd:ee:ff").
/// The result arrives via `on_completion(tag, ...)`.
/// `out_ipv6_link_local` (nullable) receives whether link-local provisioning was requested.
/// Returns 1 issued, 2 queued, negative on error (no completion will follow).
#[no_mangle]
pub extern "C" fn peerlink_session_connect(
    h: *mut c_void,
    device_address: *const c_char,
    tag: u64,
    out_ipv6_link_local: *mut bool,
) -> c_int {
    let Some(address) = str_arg(device_address).and_then(|s| s.parse::<MacAddress>().ok()) else {
        return BAD_ARGUMENT;
    };
    with_handle(h, |session, handle| {
        let completion = completion_for(&handle.observer, tag);
        match session.connect_to_peer(address, completion) {
            Ok(ticket) => {
                if !out_ipv6_link_local.is_null() {
                    unsafe {
                        *out_ipv6_link_local =
                            ticket.provisioning == IpProvisioning::Ipv6LinkLocal;
                    }
                }
                dispatch_code(ticket.dispatch)
            }
            Err(e) => e.code(),
        }
    })
}

/// Platform result for a discover/connect promise. Returns 1 if delivered, 0 if ignored.
#[no_mangle]
pub extern "C" fn peerlink_promise_resolve(
    h: *mut c_void,
    promise: u64,
    success: bool,
    reason: c_int,
) -> c_int {
    with_session(h, |s| {
        c_int::from(s.resolve_promise(PromiseId(promise), success, reason))
    })
}

fn push(h: *mut c_void, event: PlatformEvent) -> c_int {
    with_session(h, |s| {
        s.handle_event(event);
        0
    })
}

#[no_mangle]
pub extern "C" fn peerlink_on_state_changed(h: *mut c_void, enabled: bool) -> c_int {
    push(h, PlatformEvent::StateChanged { enabled })
}

#[no_mangle]
pub extern "C" fn peerlink_on_peers_changed(h: *mut c_void) -> c_int {
    push(h, PlatformEvent::PeersChanged)
}

#[no_mangle]
pub extern "C" fn peerlink_on_connection_changed(
    h: *mut c_void,
    connected_or_connecting: bool,
    connected: bool,
) -> c_int {
    push(
        h,
        PlatformEvent::ConnectionChanged {
            connected_or_connecting,
            connected,
        },
    )
}

#[no_mangle]
pub extern "C" fn peerlink_on_device_changed(h: *mut c_void) -> c_int {
    push(h, PlatformEvent::DeviceChanged)
}

#[no_mangle]
pub extern "C" fn peerlink_on_channel_lost(h: *mut c_void) -> c_int {
    push(h, PlatformEvent::ChannelLost)
}

/// Reply to `request_connection_info`. `group_owner_ip` may be null.
#[no_mangle]
pub extern "C" fn peerlink_on_connection_info(
    h: *mut c_void,
    group_formed: bool,
    is_group_owner: bool,
    group_owner_ip: *const c_char,
) -> c_int {
    let group_owner_ip = if group_owner_ip.is_null() {
        None
    } else {
        match str_arg(group_owner_ip).and_then(|s| s.parse::<IpAddr>().ok()) {
            Some(ip) => Some(ip),
            None => return BAD_ARGUMENT,
        }
    };
    push(
        h,
        PlatformEvent::ConnectionInfo {
            info: ConnectionInfo {
                group_formed,
                is_group_owner,
                group_owner_ip,
            },
        },
    )
}

/// Reply to `request_group_info`. A null `owner_address` means no group.
#[no_mangle]
pub extern "C" fn peerlink_on_group_info(
    h: *mut c_void,
    owner_address: *const c_char,
    interface_name: *const c_char,
) -> c_int {
    let group = if owner_address.is_null() {
        None
    } else {
        let Some(owner_address) = str_arg(owner_address).and_then(|s| s.parse().ok()) else {
            return BAD_ARGUMENT;
        };
        Some(GroupDetails {
            owner_address,
            interface_name: str_arg(interface_name).unwrap_or_default().to_string(),
        })
    };
    push(h, PlatformEvent::GroupInfo { group })
}

/// Reply to `request_peer_list`. Entries with a missing or malformed address are skipped.
/// Returns the number of peers accepted, or -1.
#[no_mangle]
pub extern "C" fn peerlink_on_peer_list(
    h: *mut c_void,
    names: *const *const c_char,
    addresses: *const *const c_char,
    count: usize,
) -> c_int {
    if count > 0 && (names.is_null() || addresses.is_null()) {
        return BAD_ARGUMENT;
    }
    let (names, addresses) = if count == 0 {
        (&[][..], &[][..])
    } else {
        unsafe {
            (
                slice::from_raw_parts(names, count),
                slice::from_raw_parts(addresses, count),
            )
        }
    };
    let mut peers = Vec::with_capacity(count);
    for (&name, &address) in names.iter().zip(addresses) {
        match str_arg(address).and_then(|s| s.parse::<MacAddress>().ok()) {
            Some(address) => peers.push(Peer::new(str_arg(name).unwrap_or_default(), address)),
            None => warn!("skipping peer with malformed address"),
        }
    }
    let accepted = c_int::try_from(peers.len()).unwrap_or(c_int::MAX);
    match push(h, PlatformEvent::PeerList { peers }) {
        0 => accepted,
        err => err,
    }
}

/// Reply to `request_device_info`. A null `name` means no device was reported.
#[no_mangle]
pub extern "C" fn peerlink_on_device_info(
    h: *mut c_void,
    name: *const c_char,
    address: *const c_char,
) -> c_int {
    let device = str_arg(name).map(|name| DeviceIdentity {
        name: name.to_string(),
        address: str_arg(address).and_then(|s| s.parse().ok()),
    });
    push(h, PlatformEvent::DeviceInfo { device })
}

/// A broadcast the host could not classify.
#[no_mangle]
pub extern "C" fn peerlink_on_unknown(h: *mut c_void, action: *const c_char) -> c_int {
    let action = str_arg(action).unwrap_or_default().to_string();
    push(h, PlatformEvent::Unknown { action })
}
