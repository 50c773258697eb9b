//! Party controller configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default session tag written into the `game` metadata key.
pub const DEFAULT_GAME_TAG: &str = "myGameId";

/// Default maximum number of members per party.
pub const DEFAULT_MAX_MEMBERS: u32 = 4;

/// Default minimum member count required to start the transport.
pub const DEFAULT_MIN_START_MEMBERS: u32 = 1;

/// Default deadline for all members to connect to the transport.
pub const DEFAULT_RENDEZVOUS_TIMEOUT_SECONDS: u64 = 30;

/// Default interval between transport client-count checks.
pub const DEFAULT_RENDEZVOUS_POLL_INTERVAL_MS: u64 = 50;

/// Default lifetime of a pending kick intent.
pub const DEFAULT_KICK_INTENT_TTL_SECONDS: u64 = 10;

/// Default display name for the local player.
pub const DEFAULT_LOCAL_NAME: &str = "player";

/// Party controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Session tag used to filter party searches (default: "myGameId").
    pub game_tag: String,

    /// Maximum members in a hosted party (default: 4).
    pub max_members: u32,

    /// Minimum members before the owner may start the transport (default: 1).
    pub min_start_members: u32,

    /// Skip the minimum member check when starting the transport.
    pub override_start_conditions: bool,

    /// Transport rendezvous deadline (default: 30s).
    pub rendezvous_timeout: Duration,

    /// Transport rendezvous poll interval (default: 50ms).
    pub rendezvous_poll_interval: Duration,

    /// Pending kick intent lifetime (default: 10s).
    pub kick_intent_ttl: Duration,

    /// Display name of the local player (default: "player").
    pub local_name: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_tag: DEFAULT_GAME_TAG.to_string(),
            max_members: DEFAULT_MAX_MEMBERS,
            min_start_members: DEFAULT_MIN_START_MEMBERS,
            override_start_conditions: false,
            rendezvous_timeout: Duration::from_secs(DEFAULT_RENDEZVOUS_TIMEOUT_SECONDS),
            rendezvous_poll_interval: Duration::from_millis(DEFAULT_RENDEZVOUS_POLL_INTERVAL_MS),
            kick_intent_ttl: Duration::from_secs(DEFAULT_KICK_INTENT_TTL_SECONDS),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let game_tag = vars
            .get("PARTY_GAME_TAG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GAME_TAG.to_string());
        if game_tag.is_empty() || game_tag.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(
                "PARTY_GAME_TAG must be a non-empty token without whitespace".to_string(),
            ));
        }

        let local_name = vars
            .get("PARTY_LOCAL_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOCAL_NAME.to_string());

        let max_members = parse_var(vars, "PARTY_MAX_MEMBERS", DEFAULT_MAX_MEMBERS)?;
        if max_members == 0 {
            return Err(ConfigError::InvalidValue(
                "PARTY_MAX_MEMBERS must be at least 1".to_string(),
            ));
        }

        let min_start_members =
            parse_var(vars, "PARTY_MIN_START_MEMBERS", DEFAULT_MIN_START_MEMBERS)?;
        if min_start_members > max_members {
            return Err(ConfigError::InvalidValue(format!(
                "PARTY_MIN_START_MEMBERS ({min_start_members}) exceeds PARTY_MAX_MEMBERS ({max_members})"
            )));
        }

        let override_start_conditions =
            parse_var(vars, "PARTY_OVERRIDE_START_CONDITIONS", false)?;

        let rendezvous_timeout = Duration::from_secs(parse_var(
            vars,
            "PARTY_RENDEZVOUS_TIMEOUT_SECONDS",
            DEFAULT_RENDEZVOUS_TIMEOUT_SECONDS,
        )?);

        let poll_ms = parse_var(
            vars,
            "PARTY_RENDEZVOUS_POLL_INTERVAL_MS",
            DEFAULT_RENDEZVOUS_POLL_INTERVAL_MS,
        )?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "PARTY_RENDEZVOUS_POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }

        let kick_intent_ttl = Duration::from_secs(parse_var(
            vars,
            "PARTY_KICK_INTENT_TTL_SECONDS",
            DEFAULT_KICK_INTENT_TTL_SECONDS,
        )?);

        Ok(Config {
            game_tag,
            max_members,
            min_start_members,
            override_start_conditions,
            rendezvous_timeout,
            rendezvous_poll_interval: Duration::from_millis(poll_ms),
            kick_intent_ttl,
            local_name,
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}
