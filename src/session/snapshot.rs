//! Identity snapshot record and its persisted schema.
//!
//! SCHEMA
//! ======
//! One durable key holds the current record:
//! `{"version":2,"user":…,"isAuthenticated":…,"capturedAt":…,"snapshotId":…}`.
//! Two older shapes are migrated on read:
//! - v1: the same fields without `version`.
//! - legacy `auth_state`: `{"user":…,"isAuthenticated":…,"timestamp":…}`
//!   under its own key.
//!
//! Migration keeps the original capture time, so a migrated record is still
//! subject to the staleness window.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::duration_ms;
use crate::net::types::UserPayload;

pub const SNAPSHOT_VERSION: u64 = 2;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate a random 16-byte hex correlation id. Never used for authorization.
#[must_use]
pub fn generate_snapshot_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Last identity the server confirmed, as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySnapshot {
    pub user: UserPayload,
    pub is_authenticated: bool,
    /// Unix epoch millis of the last server confirmation.
    pub captured_at: i64,
    pub snapshot_id: String,
}

impl IdentitySnapshot {
    #[must_use]
    pub fn capture(user: UserPayload, is_authenticated: bool, now_ms: i64) -> Self {
        Self { user, is_authenticated, captured_at: now_ms, snapshot_id: generate_snapshot_id() }
    }

    /// Older than `window`, or dated in the future (clock moved backwards or
    /// the record was written by hand).
    #[must_use]
    pub fn is_stale(&self, now_ms: i64, window: Duration) -> bool {
        let age = now_ms.saturating_sub(self.captured_at);
        age < 0 || age > duration_ms(window)
    }

    /// Claims an identity worth showing.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_authenticated && !self.user.is_null()
    }
}

// =============================================================================
// ENCODING
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot parse failed: {0}")]
    Parse(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u64),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[derive(Serialize)]
struct VersionedRef<'a> {
    version: u64,
    #[serde(flatten)]
    snapshot: &'a IdentitySnapshot,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAuthState {
    user: UserPayload,
    is_authenticated: Option<bool>,
    timestamp: i64,
}

/// A decoded record and whether it came from an older schema.
#[derive(Debug)]
pub struct Decoded {
    pub snapshot: IdentitySnapshot,
    pub migrated: bool,
}

/// Serialize in the current schema.
///
/// # Errors
///
/// Returns a [`SnapshotError`] if the user payload cannot be serialized.
pub fn encode(snapshot: &IdentitySnapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&VersionedRef { version: SNAPSHOT_VERSION, snapshot })?)
}

/// Decode a record stored under the current key, accepting v1 and v2.
///
/// # Errors
///
/// Returns a [`SnapshotError`] for unparsable JSON or a version this build
/// does not understand.
pub fn decode(raw: &str) -> Result<Decoded, SnapshotError> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    let version = match value.as_object_mut() {
        Some(obj) => obj.remove("version"),
        None => return Err(SnapshotError::Parse("snapshot is not an object".into())),
    };

    match version.as_ref().map(serde_json::Value::as_u64) {
        None => {
            let snapshot = serde_json::from_value(value)?;
            Ok(Decoded { snapshot, migrated: true })
        }
        Some(Some(SNAPSHOT_VERSION)) => {
            let snapshot = serde_json::from_value(value)?;
            Ok(Decoded { snapshot, migrated: false })
        }
        Some(Some(other)) => Err(SnapshotError::UnsupportedVersion(other)),
        Some(None) => Err(SnapshotError::Parse("version is not an integer".into())),
    }
}

/// Decode the legacy `auth_state` record. A fresh snapshot id is assigned.
///
/// # Errors
///
/// Returns a [`SnapshotError`] if the record does not have the legacy shape.
pub fn decode_legacy(raw: &str) -> Result<IdentitySnapshot, SnapshotError> {
    let legacy: LegacyAuthState = serde_json::from_str(raw)?;
    let is_authenticated = legacy.is_authenticated.unwrap_or(!legacy.user.is_null());
    Ok(IdentitySnapshot {
        user: legacy.user,
        is_authenticated,
        captured_at: legacy.timestamp,
        snapshot_id: generate_snapshot_id(),
    })
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
