//! Server configuration parsed from environment variables.
//!
//! Every knob has a default so a bare `cargo run` serves a local dev setup.
//! Values that are present but unparseable are rejected instead of silently
//! falling back, so a typo in `MAX_ROOMS` fails startup loudly.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_HISTORY_PER_ROOM: usize = 500;
const DEFAULT_MAX_ROOMS: usize = 1000;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
const DEFAULT_BROADCAST_SEND_TIMEOUT_MS: u64 = 2000;
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
const DEFAULT_ROOM_IDLE_TTL_SECS: u64 = 300;
const DEFAULT_ROOM_SWEEP_INTERVAL_SECS: u64 = 30;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173,\
http://localhost:3000,http://127.0.0.1:3000,http://localhost:5174,http://127.0.0.1:5174,\
https://*.onrender.com";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Bound on each room's action log (`MAX_HISTORY_PER_ROOM`).
    pub max_history_per_room: usize,
    /// Bound on live rooms (`MAX_ROOMS`).
    pub max_rooms: usize,
    /// Optional shared secret required on websocket upgrade.
    pub shared_secret: Option<String>,
    /// Browser origins allowed for CORS and websocket upgrades. Empty allows all.
    pub allowed_origins: Vec<String>,
    /// Accept upgrades that carry no `Origin` header (non-browser clients).
    pub allow_missing_origin: bool,
    pub max_message_bytes: usize,
    pub broadcast_send_timeout: Duration,
    /// Close connections that send nothing for this long. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Per-connection outbound queue; a member that falls this far behind is dropped.
    pub outbound_queue_capacity: usize,
    /// Rooms without members for this long are reclaimed by the sweep.
    pub room_idle_ttl: Duration,
    pub room_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_history_per_room: DEFAULT_MAX_HISTORY_PER_ROOM,
            max_rooms: DEFAULT_MAX_ROOMS,
            shared_secret: None,
            allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
            allow_missing_origin: true,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            broadcast_send_timeout: Duration::from_millis(DEFAULT_BROADCAST_SEND_TIMEOUT_MS),
            idle_timeout: None,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            room_idle_ttl: Duration::from_secs(DEFAULT_ROOM_IDLE_TTL_SECS),
            room_sweep_interval: Duration::from_secs(DEFAULT_ROOM_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    /// Build config from process environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `MAX_HISTORY_PER_ROOM`: default 500
    /// - `MAX_ROOMS`: default 1000
    /// - `SHARED_SECRET`: unset disables the check
    /// - `ALLOWED_ORIGINS`: comma-separated; `*` allows any origin
    /// - `ALLOW_MISSING_ORIGIN`: default true
    /// - `MAX_MESSAGE_BYTES`: default 65536
    /// - `BROADCAST_SEND_TIMEOUT_MS`: default 2000
    /// - `IDLE_TIMEOUT_SECS`: unset or 0 disables
    /// - `OUTBOUND_QUEUE_CAPACITY`: default 256
    /// - `ROOM_IDLE_TTL_SECS`: default 300
    /// - `ROOM_SWEEP_INTERVAL_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let shared_secret = lookup("SHARED_SECRET")
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());
        let allowed_origins = lookup("ALLOWED_ORIGINS").map_or(defaults.allowed_origins, |raw| parse_origins(&raw));
        let allow_missing_origin = env_bool(&lookup, "ALLOW_MISSING_ORIGIN", defaults.allow_missing_origin)?;
        let idle_secs: u64 = env_parse(&lookup, "IDLE_TIMEOUT_SECS", 0)?;
        let outbound_queue_capacity = env_parse(&lookup, "OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY)?;
        if outbound_queue_capacity == 0 {
            return Err(ConfigError::Zero { key: "OUTBOUND_QUEUE_CAPACITY" });
        }
        let sweep_secs = env_parse(&lookup, "ROOM_SWEEP_INTERVAL_SECS", DEFAULT_ROOM_SWEEP_INTERVAL_SECS)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Zero { key: "ROOM_SWEEP_INTERVAL_SECS" });
        }

        Ok(Self {
            port: env_parse(&lookup, "PORT", DEFAULT_PORT)?,
            max_history_per_room: env_parse(&lookup, "MAX_HISTORY_PER_ROOM", DEFAULT_MAX_HISTORY_PER_ROOM)?,
            max_rooms: env_parse(&lookup, "MAX_ROOMS", DEFAULT_MAX_ROOMS)?,
            shared_secret,
            allowed_origins,
            allow_missing_origin,
            max_message_bytes: env_parse(&lookup, "MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?,
            broadcast_send_timeout: Duration::from_millis(env_parse(
                &lookup,
                "BROADCAST_SEND_TIMEOUT_MS",
                DEFAULT_BROADCAST_SEND_TIMEOUT_MS,
            )?),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            outbound_queue_capacity,
            room_idle_ttl: Duration::from_secs(env_parse(&lookup, "ROOM_IDLE_TTL_SECS", DEFAULT_ROOM_IDLE_TTL_SECS)?),
            room_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }

    /// Whether a browser `Origin` header value may connect.
    ///
    /// Entries match exactly, `*` matches anything, and `scheme://*.domain`
    /// matches any subdomain of `domain` under that scheme.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        self.allowed_origins
            .iter()
            .any(|allowed| origin_matches(allowed, origin))
    }
}

fn origin_matches(allowed: &str, origin: &str) -> bool {
    if allowed == "*" || allowed == origin {
        return true;
    }
    let Some((scheme, host_pattern)) = allowed.split_once("://") else {
        return false;
    };
    let Some(suffix) = host_pattern.strip_prefix("*.") else {
        return false;
    };
    let Some(host) = origin.strip_prefix(scheme).and_then(|rest| rest.strip_prefix("://")) else {
        return false;
    };
    host.strip_suffix(suffix)
        .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.'))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key, value: raw }),
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
