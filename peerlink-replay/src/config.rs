//! Load config from file and environment.

use anyhow::Context;
use peerlink_core::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Replay configuration. File: ~/.config/peerlink/replay.toml or /etc/peerlink/replay.toml.
/// Env overrides: PEERLINK_QUEUE_CAPACITY, PEERLINK_GO_INTENT, PEERLINK_IPV6_LINK_LOCAL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Session settings, `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// Whether the scripted platform supports IPv6 link-local provisioning (default true).
    #[serde(default = "default_platform_ipv6_link_local")]
    pub platform_ipv6_link_local: bool,
}

fn default_platform_ipv6_link_local() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            platform_ipv6_link_local: default_platform_ipv6_link_local(),
        }
    }
}

/// Load config: explicit path if given, else the first existing default path, else defaults;
/// then env vars. The result is validated.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(path) => read(path)?,
        None => load_file().unwrap_or_default(),
    };
    apply_overrides(&mut c, |key| std::env::var(key).ok());
    c.session.validate().context("invalid session config")?;
    Ok(c)
}

fn apply_overrides(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERLINK_QUEUE_CAPACITY") {
        match s.parse::<usize>() {
            Ok(n) => c.session.command_queue_capacity = n,
            Err(_) => warn!(value = %s, "ignoring PEERLINK_QUEUE_CAPACITY"),
        }
    }
    if let Some(s) = var("PEERLINK_GO_INTENT") {
        match s.parse::<u8>() {
            Ok(n) => c.session.group_owner_intent = Some(n),
            Err(_) => warn!(value = %s, "ignoring PEERLINK_GO_INTENT"),
        }
    }
    if let Some(s) = var("PEERLINK_IPV6_LINK_LOCAL") {
        match s.parse::<bool>() {
            Ok(b) => c.session.request_ipv6_link_local = b,
            Err(_) => warn!(value = %s, "ignoring PEERLINK_IPV6_LINK_LOCAL"),
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peerlink/replay.toml"));
    }
    out.push(PathBuf::from("/etc/peerlink/replay.toml"));
    out
}

fn read(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match read(&p) {
                Ok(c) => return Some(c),
                Err(e) => warn!(error = %format!("{e:#}"), "ignoring config file"),
            }
            break;
        }
    }
    None
}
