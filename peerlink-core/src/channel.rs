//! Channel manager: caches the platform channel and re-acquires it lazily after loss.

use tracing::{info, warn};

use crate::platform::{ChannelHandle, PlatformError, PlatformService};

#[derive(Debug, Default)]
pub struct ChannelManager {
    current: Option<ChannelHandle>,
    /// Number of successful acquisitions.
    generation: u64,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current channel, initializing one through the platform if there is none.
    pub fn ensure_channel<P: PlatformService + ?Sized>(
        &mut self,
        platform: &mut P,
    ) -> Result<ChannelHandle, PlatformError> {
        if let Some(channel) = self.current {
            return Ok(channel);
        }
        let channel = platform.initialize_channel()?;
        self.generation += 1;
        if self.generation > 1 {
            info!(%channel, generation = self.generation, "channel re-acquired");
        }
        self.current = Some(channel);
        Ok(channel)
    }

    /// Invalidate the cached channel. Next `ensure_channel` re-initializes.
    pub fn on_channel_lost(&mut self) {
        if let Some(channel) = self.current.take() {
            warn!(%channel, "channel lost; will re-initialize on next use");
        }
    }

    pub fn release(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<ChannelHandle> {
        self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ConnectConfig;
    use crate::promise::PromiseId;

    #[derive(Default)]
    struct CountingPlatform {
        inits: u64,
        fail: bool,
    }

    impl PlatformService for CountingPlatform {
        fn initialize_channel(&mut self) -> Result<ChannelHandle, PlatformError> {
            if self.fail {
                return Err(PlatformError::Unavailable);
            }
            self.inits += 1;
            Ok(ChannelHandle(100 + self.inits))
        }
        fn register_receiver(&mut self) {}
        fn unregister_receiver(&mut self) {}
        fn request_device_info(&mut self, _: ChannelHandle) {}
        fn request_connection_info(&mut self, _: ChannelHandle) {}
        fn request_group_info(&mut self, _: ChannelHandle) {}
        fn request_peer_list(&mut self, _: ChannelHandle) {}
        fn discover_peers(&mut self, _: ChannelHandle, _: PromiseId) {}
        fn connect(&mut self, _: ChannelHandle, _: &ConnectConfig, _: PromiseId) {}
        fn supports_ipv6_link_local(&self) -> bool {
            true
        }
    }

    #[test]
    fn caches_channel() {
        let mut platform = CountingPlatform::default();
        let mut mgr = ChannelManager::new();
        let a = mgr.ensure_channel(&mut platform).unwrap();
        let b = mgr.ensure_channel(&mut platform).unwrap();
        assert_eq!(a, b);
        assert_eq!(platform.inits, 1);
    }

    #[test]
    fn reinitializes_after_loss() {
        let mut platform = CountingPlatform::default();
        let mut mgr = ChannelManager::new();
        let first = mgr.ensure_channel(&mut platform).unwrap();
        mgr.on_channel_lost();
        assert_eq!(mgr.current(), None);
        let second = mgr.ensure_channel(&mut platform).unwrap();
        assert_ne!(first, second);
        assert_eq!(mgr.generation(), 2);
    }

    #[test]
    fn failure_leaves_no_channel() {
        let mut platform = CountingPlatform {
            fail: true,
            ..Default::default()
        };
        let mut mgr = ChannelManager::new();
        assert_eq!(
            mgr.ensure_channel(&mut platform),
            Err(PlatformError::Unavailable)
        );
        assert_eq!(mgr.current(), None);
        platform.fail = false;
        assert!(mgr.ensure_channel(&mut platform).is_ok());
    }

    #[test]
    fn repeated_loss_is_harmless() {
        let mut mgr = ChannelManager::new();
        mgr.on_channel_lost();
        mgr.on_channel_lost();
        assert_eq!(mgr.current(), None);
    }
}
