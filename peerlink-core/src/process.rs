//! Process-scoped initialization. Runs once, before the first session exists.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "peerlink_core=info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the log subscriber. Returns true on the first call, false afterwards.
/// Logs go to stderr. A subscriber already installed by the host is kept.
pub fn init() -> bool {
    let mut first = false;
    INITIALIZED.get_or_init(|| {
        first = true;
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
    first
}

pub fn is_initialized() -> bool {
    INITIALIZED.get().is_some()
}
