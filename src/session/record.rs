//! Session record store: sole owner of persisted identity state.
//!
//! ARCHITECTURE
//! ============
//! Durable store (shared by all tabs, survives restarts):
//! - `session.identity`: the versioned `IdentitySnapshot`.
//! - `session.logged_out`: the logout negative-cache.
//!
//! Ephemeral store (this tab only):
//! - `session.liveness`: this tab has confirmed the snapshot itself.
//! - `session.heartbeat_at`: last successful heartbeat, diagnostics only.
//!
//! A durable snapshot is trusted only together with this tab's liveness
//! marker, inside the staleness window, and while no logout is recorded.
//!
//! ERROR HANDLING
//! ==============
//! Storage failures never escape `load`, `clear`, or the flag helpers: they
//! are logged and read as "nothing stored". A failed read can therefore only
//! push the caller towards asking the server, never towards trusting a cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::snapshot::{self, Decoded, IdentitySnapshot};
use crate::clock::Clock;
use crate::net::types::UserPayload;
use crate::storage::{KeyValueStore, StorageError};

pub(crate) const SNAPSHOT_KEY: &str = "session.identity";
pub(crate) const LEGACY_AUTH_STATE_KEY: &str = "auth_state";
pub(crate) const LOGOUT_FLAG_KEY: &str = "session.logged_out";
pub(crate) const LIVENESS_KEY: &str = "session.liveness";
pub(crate) const HEARTBEAT_AT_KEY: &str = "session.heartbeat_at";

const LOGOUT_FLAG_VALUE: &str = "1";

/// Read-only view of persisted session state for logs and support tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub snapshot_id: Option<String>,
    pub captured_at: Option<i64>,
    pub last_heartbeat_at: Option<i64>,
    pub liveness_present: bool,
    pub logout_flag: bool,
}

/// One instance per tab: construct it once with that tab's ephemeral store
/// and share it by `Arc`.
pub struct SessionRecordStore {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    session_timeout: Duration,
}

impl SessionRecordStore {
    #[must_use]
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        ephemeral: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        session_timeout: Duration,
    ) -> Self {
        Self { durable, ephemeral, clock, session_timeout }
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    /// Write a fresh snapshot and this tab's liveness marker.
    ///
    /// Does not touch the logout flag; re-enabling recovery is the separate
    /// [`Self::clear_logout_flag`].
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if either store rejects the write.
    pub async fn save(&self, user: UserPayload, is_authenticated: bool) -> Result<IdentitySnapshot, StorageError> {
        let now = self.clock.now_ms();
        let snapshot = IdentitySnapshot::capture(user, is_authenticated, now);
        let raw = snapshot::encode(&snapshot).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.durable.set(SNAPSHOT_KEY, &raw).await?;
        self.ephemeral.set(LIVENESS_KEY, &now.to_string()).await?;

        debug!(snapshot_id = %snapshot.snapshot_id, captured_at = now, "identity snapshot saved");
        Ok(snapshot)
    }

    /// The cached identity, if it is still trustworthy for this tab.
    ///
    /// Stale or unusable snapshots are deleted on the way out. A snapshot
    /// missing only this tab's liveness marker is kept for other tabs.
    pub async fn load(&self) -> Option<IdentitySnapshot> {
        if self.has_logout_flag().await {
            return None;
        }

        let snapshot = self.read_snapshot().await?;
        let now = self.clock.now_ms();
        if snapshot.is_stale(now, self.session_timeout) || !snapshot.is_usable() {
            debug!(
                snapshot_id = %snapshot.snapshot_id,
                captured_at = snapshot.captured_at,
                "discarding stale identity snapshot"
            );
            remove_quietly(self.durable.as_ref(), SNAPSHOT_KEY).await;
            return None;
        }

        if !self.liveness_present().await {
            debug!(snapshot_id = %snapshot.snapshot_id, "snapshot not confirmed in this tab; needs re-validation");
            return None;
        }

        Some(snapshot)
    }

    /// End the session locally: engage the logout flag, then delete the
    /// snapshot and this tab's markers. Idempotent.
    pub async fn clear(&self) {
        if let Err(e) = self.durable.set(LOGOUT_FLAG_KEY, LOGOUT_FLAG_VALUE).await {
            warn!(error = %e, "failed to record logout flag");
        }
        remove_quietly(self.durable.as_ref(), SNAPSHOT_KEY).await;
        remove_quietly(self.durable.as_ref(), LEGACY_AUTH_STATE_KEY).await;
        remove_quietly(self.ephemeral.as_ref(), LIVENESS_KEY).await;
        remove_quietly(self.ephemeral.as_ref(), HEARTBEAT_AT_KEY).await;
        debug!("local session cleared");
    }

    /// Refresh this tab's liveness marker without rewriting the snapshot.
    pub async fn touch_liveness(&self) {
        let now = self.clock.now_ms().to_string();
        if let Err(e) = self.ephemeral.set(LIVENESS_KEY, &now).await {
            warn!(error = %e, "failed to refresh liveness marker");
        }
        if let Err(e) = self.ephemeral.set(HEARTBEAT_AT_KEY, &now).await {
            warn!(error = %e, "failed to record heartbeat time");
        }
    }

    // =========================================================================
    // LOGOUT FLAG
    // =========================================================================

    pub async fn has_logout_flag(&self) -> bool {
        match self.durable.get(LOGOUT_FLAG_KEY).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(error = %e, "logout flag unreadable; treating as unset");
                false
            }
        }
    }

    pub async fn clear_logout_flag(&self) {
        match self.durable.remove(LOGOUT_FLAG_KEY).await {
            Ok(()) => info!("logout flag cleared; recovery re-enabled"),
            Err(e) => warn!(error = %e, "failed to clear logout flag"),
        }
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Snapshot of persisted state without any of `load`'s side effects.
    pub async fn diagnostics(&self) -> SessionDiagnostics {
        let snapshot = match self.durable.get(SNAPSHOT_KEY).await {
            Ok(Some(raw)) => snapshot::decode(&raw).ok().map(|d| d.snapshot),
            _ => None,
        };
        let last_heartbeat_at = match self.ephemeral.get(HEARTBEAT_AT_KEY).await {
            Ok(Some(raw)) => raw.parse().ok(),
            _ => None,
        };

        SessionDiagnostics {
            snapshot_id: snapshot.as_ref().map(|s| s.snapshot_id.clone()),
            captured_at: snapshot.as_ref().map(|s| s.captured_at),
            last_heartbeat_at,
            liveness_present: self.liveness_present().await,
            logout_flag: self.has_logout_flag().await,
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn liveness_present(&self) -> bool {
        match self.ephemeral.get(LIVENESS_KEY).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(error = %e, "liveness marker unreadable");
                false
            }
        }
    }

    async fn read_snapshot(&self) -> Option<IdentitySnapshot> {
        match self.durable.get(SNAPSHOT_KEY).await {
            Ok(Some(raw)) => match snapshot::decode(&raw) {
                Ok(Decoded { snapshot, migrated }) => {
                    if migrated {
                        self.rewrite(&snapshot).await;
                    }
                    Some(snapshot)
                }
                Err(e) => {
                    warn!(error = %e, "identity snapshot undecodable; removing");
                    remove_quietly(self.durable.as_ref(), SNAPSHOT_KEY).await;
                    None
                }
            },
            Ok(None) => self.migrate_legacy().await,
            Err(e) => {
                warn!(error = %e, "durable store unreadable; treating as no session");
                None
            }
        }
    }

    async fn migrate_legacy(&self) -> Option<IdentitySnapshot> {
        let raw = match self.durable.get(LEGACY_AUTH_STATE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "legacy auth record unreadable");
                return None;
            }
        };

        let decoded = snapshot::decode_legacy(&raw);
        remove_quietly(self.durable.as_ref(), LEGACY_AUTH_STATE_KEY).await;
        match decoded {
            Ok(snapshot) => {
                self.rewrite(&snapshot).await;
                info!(snapshot_id = %snapshot.snapshot_id, "migrated legacy auth_state record");
                Some(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "legacy auth record undecodable; dropped");
                None
            }
        }
    }

    async fn rewrite(&self, snapshot: &IdentitySnapshot) {
        let result = match snapshot::encode(snapshot) {
            Ok(raw) => self.durable.set(SNAPSHOT_KEY, &raw).await,
            Err(e) => Err(StorageError::Serialization(e.to_string())),
        };
        if let Err(e) = result {
            warn!(snapshot_id = %snapshot.snapshot_id, error = %e, "failed to rewrite migrated snapshot");
        }
    }

}

async fn remove_quietly(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key).await {
        warn!(key, error = %e, "storage delete failed");
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
