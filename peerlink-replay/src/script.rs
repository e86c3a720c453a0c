//! Script format: one JSON object per line. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"op":"init"}
//! {"op":"event","event":"device_info","device":{"name":"Pixel","address":null}}
//! {"op":"discover","tag":"scan"}
//! {"op":"resolve","success":true}
//! ```

use peerlink_core::{MacAddress, PlatformEvent, PromiseId};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Init,
    Discover {
        #[serde(default)]
        tag: Option<String>,
    },
    Connect {
        address: MacAddress,
        #[serde(default)]
        tag: Option<String>,
    },
    Pause,
    Resume,
    Finalize,
    /// Resolve `promise`, or the most recently issued one when omitted.
    Resolve {
        #[serde(default)]
        promise: Option<PromiseId>,
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        reason: i32,
    },
    /// Make channel creation fail (or succeed again) from now on.
    SetChannel {
        available: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Event(PlatformEvent),
}

fn default_success() -> bool {
    true
}

/// Parse one script line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Step>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
