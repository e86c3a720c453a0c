//! Session configuration.

use serde::Deserialize;

/// Highest group owner intent the platform accepts.
pub const MAX_GROUP_OWNER_INTENT: u8 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Commands accepted before the device identity is known (default 8).
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
    /// Group owner intent for connect requests, 0..=15. Unset lets the platform choose.
    #[serde(default)]
    pub group_owner_intent: Option<u8>,
    /// Ask for IPv6 link-local client provisioning when the platform supports it (default true).
    #[serde(default = "default_request_ipv6_link_local")]
    pub request_ipv6_link_local: bool,
}

fn default_command_queue_capacity() -> usize {
    8
}
fn default_request_ipv6_link_local() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: default_command_queue_capacity(),
            group_owner_intent: None,
            request_ipv6_link_local: default_request_ipv6_link_local(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if let Some(intent) = self.group_owner_intent {
            if intent > MAX_GROUP_OWNER_INTENT {
                return Err(ConfigError::GroupOwnerIntent(intent));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("command_queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("group_owner_intent {0} out of range 0..=15")]
    GroupOwnerIntent(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SessionConfig::from_toml_str("").unwrap(), SessionConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let config = SessionConfig::from_toml_str(
            "command_queue_capacity = 2\n\
             group_owner_intent = 15\n\
             request_ipv6_link_local = false\n",
        )
        .unwrap();
        assert_eq!(config.command_queue_capacity, 2);
        assert_eq!(config.group_owner_intent, Some(15));
        assert!(!config.request_ipv6_link_local);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_toml_str("group_owner_intent = 16"),
            Err(ConfigError::GroupOwnerIntent(16))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("command_queue_capacity = 0"),
            Err(ConfigError::ZeroQueueCapacity)
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("proxy_port = 3128"),
            Err(ConfigError::Parse(_))
        ));
    }
}
