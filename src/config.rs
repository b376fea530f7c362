//! Session tuning knobs.
//!
//! The `DEFAULT_*` constants are the shipped configuration. `from_env` lets a
//! host override them without a rebuild; unset or unparsable values fall back
//! to the constants.

use std::time::Duration;

/// Age after which a cached identity snapshot is ignored outright.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1000;
/// Interval between liveness re-validations while authenticated.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Upper bound on a single `GET /api/auth/user` round-trip.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Pause between wiping local state and re-running recovery in force-restore.
pub const DEFAULT_RESTORE_SETTLE_MS: u64 = 100;
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub restore_settle: Duration,
    /// Where logout hard-navigates to.
    pub login_path: String,
    /// Origin serving `/api/auth/*`, without a trailing slash.
    pub api_base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            restore_settle: Duration::from_millis(DEFAULT_RESTORE_SETTLE_MS),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `SESSION_TIMEOUT_MS`: default 1800000
    /// - `SESSION_HEARTBEAT_INTERVAL_MS`: default 30000
    /// - `SESSION_REQUEST_TIMEOUT_MS`: default 10000
    /// - `SESSION_CONNECT_TIMEOUT_MS`: default 5000
    /// - `SESSION_RESTORE_SETTLE_MS`: default 100
    /// - `SESSION_LOGIN_PATH`: default `/login`
    /// - `SESSION_API_BASE_URL`: default `http://localhost:3000`
    #[must_use]
    pub fn from_env() -> Self {
        let api_base_url = std::env::var("SESSION_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let login_path = std::env::var("SESSION_LOGIN_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_owned());

        Self {
            session_timeout: env_millis("SESSION_TIMEOUT_MS", DEFAULT_SESSION_TIMEOUT_MS),
            heartbeat_interval: env_millis("SESSION_HEARTBEAT_INTERVAL_MS", DEFAULT_HEARTBEAT_INTERVAL_MS),
            request_timeout: env_millis("SESSION_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: env_millis("SESSION_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS),
            restore_settle: env_millis("SESSION_RESTORE_SETTLE_MS", DEFAULT_RESTORE_SETTLE_MS),
            login_path,
            api_base_url,
        }
    }
}

fn env_millis(key: &str, default: u64) -> Duration {
    // A zero heartbeat or timeout would spin or fail every request.
    let ms = match env_parse(key, default) {
        0 => default,
        ms => ms,
    };
    Duration::from_millis(ms)
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
