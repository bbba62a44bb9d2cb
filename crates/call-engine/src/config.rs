//! Call engine configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults; every knob is injectable for tests.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default invitation announce backoff in seconds.
///
/// The observed cadence varies by call type (1s for direct calls, 5s for
/// appointment calls); deployments tune this per widget.
pub const DEFAULT_ANNOUNCE_INTERVAL_SECONDS: u64 = 5;

/// Default bound on unanswered invitation announcements before the call is
/// surfaced as stalled. Zero retries forever.
pub const DEFAULT_ANNOUNCE_MAX_ATTEMPTS: u32 = 60;

/// Default media region for meeting allocation.
pub const DEFAULT_MEDIA_REGION: &str = "us-east-1";

/// Default presence ping cadence in seconds. Zero disables the pinger.
pub const DEFAULT_PRESENCE_PING_INTERVAL_SECONDS: u64 = 10;

/// Default window after which a silent peer is considered offline.
pub const DEFAULT_PRESENCE_TTL_SECONDS: u64 = 30;

/// Call engine configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between invitation announcements (default: 5).
    pub announce_interval_seconds: u64,

    /// Announcements before surfacing a stalled call; 0 = unbounded
    /// (default: 60).
    pub announce_max_attempts: u32,

    /// Media region passed to the meeting allocator (default: "us-east-1").
    pub media_region: String,

    /// Seconds between presence pings; 0 disables (default: 10).
    pub presence_ping_interval_seconds: u64,

    /// Seconds of silence before a peer is considered offline (default: 30).
    pub presence_ttl_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            announce_interval_seconds: DEFAULT_ANNOUNCE_INTERVAL_SECONDS,
            announce_max_attempts: DEFAULT_ANNOUNCE_MAX_ATTEMPTS,
            media_region: DEFAULT_MEDIA_REGION.to_string(),
            presence_ping_interval_seconds: DEFAULT_PRESENCE_PING_INTERVAL_SECONDS,
            presence_ttl_seconds: DEFAULT_PRESENCE_TTL_SECONDS,
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
        let announce_interval_seconds = parse_var(
            vars,
            "HOUSECALL_ANNOUNCE_INTERVAL_SECONDS",
            DEFAULT_ANNOUNCE_INTERVAL_SECONDS,
        )?;
        if announce_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "HOUSECALL_ANNOUNCE_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }

        let announce_max_attempts = parse_var(
            vars,
            "HOUSECALL_ANNOUNCE_MAX_ATTEMPTS",
            DEFAULT_ANNOUNCE_MAX_ATTEMPTS,
        )?;

        let media_region = vars
            .get("HOUSECALL_MEDIA_REGION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MEDIA_REGION.to_string());

        let presence_ping_interval_seconds = parse_var(
            vars,
            "HOUSECALL_PRESENCE_PING_INTERVAL_SECONDS",
            DEFAULT_PRESENCE_PING_INTERVAL_SECONDS,
        )?;

        let presence_ttl_seconds = parse_var(
            vars,
            "HOUSECALL_PRESENCE_TTL_SECONDS",
            DEFAULT_PRESENCE_TTL_SECONDS,
        )?;

        Ok(Config {
            announce_interval_seconds,
            announce_max_attempts,
            media_region,
            presence_ping_interval_seconds,
            presence_ttl_seconds,
        })
    }

    /// Announce backoff as a [`Duration`].
    #[must_use]
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_seconds)
    }

    /// Presence ping cadence, `None` when disabled.
    #[must_use]
    pub fn presence_ping_interval(&self) -> Option<Duration> {
        (self.presence_ping_interval_seconds > 0)
            .then(|| Duration::from_secs(self.presence_ping_interval_seconds))
    }

    /// Presence freshness window as a [`Duration`].
    #[must_use]
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_seconds)
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
    }
}
