//! Recovery coordinator: decides, once per page load, who is logged in.
//!
//! ORDER
//! =====
//! 1. Logout flag set: fail fast, no network.
//! 2. Trusted local snapshot: re-validate it with the server. Confirmation
//!    refreshes the snapshot; a rejection ends the session locally.
//! 3. Direct server check, unless step 2 just engaged the logout flag. A
//!    rejection here also ends a snapshot step 2 kept after a transport
//!    error.
//! 4. Fail.
//!
//! The flag is re-read before every network call and before every save, so
//! a logout recorded by another tab mid-flight always wins.
//!
//! ERROR HANDLING
//! ==============
//! Only `AuthError::Rejected` ends a session. Timeouts, transport failures
//! and 5xx leave any cached snapshot in place and surface as
//! `ServerUnreachable` when nothing else decided the outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::record::SessionRecordStore;
use crate::config::SessionConfig;
use crate::net::types::{AuthApi, AuthError, UserPayload};

/// Why recovery did not produce an authenticated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    /// The user logged out; automatic recovery is disabled.
    LogoutFlag,
    /// The server answered and nobody is logged in.
    NoValidSession,
    /// The server could not be asked; the answer is unknown.
    ServerUnreachable,
}

impl RecoveryReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogoutFlag => "logout_flag",
            Self::NoValidSession => "no_valid_session",
            Self::ServerUnreachable => "server_unreachable",
        }
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// The server confirmed this identity.
    Restored {
        user: UserPayload,
        /// Id of the snapshot written for it; `None` if storage refused.
        snapshot_id: Option<String>,
    },
    Failed(RecoveryReason),
}

impl RecoveryOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserPayload> {
        match self {
            Self::Restored { user, .. } => Some(user),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<RecoveryReason> {
        match self {
            Self::Restored { .. } => None,
            Self::Failed(reason) => Some(*reason),
        }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

pub struct RecoveryCoordinator {
    record: Arc<SessionRecordStore>,
    api: Arc<dyn AuthApi>,
    request_timeout: Duration,
    restore_settle: Duration,
}

impl RecoveryCoordinator {
    #[must_use]
    pub fn new(record: Arc<SessionRecordStore>, api: Arc<dyn AuthApi>, config: &SessionConfig) -> Self {
        Self { record, api, request_timeout: config.request_timeout, restore_settle: config.restore_settle }
    }

    #[must_use]
    pub fn record(&self) -> &SessionRecordStore {
        &self.record
    }

    /// Advisory: false while a logout is recorded.
    pub async fn can_attempt_recovery(&self) -> bool {
        !self.record.has_logout_flag().await
    }

    /// Run the recovery sequence for this page load.
    pub async fn attempt_recovery(&self) -> RecoveryOutcome {
        if self.record.has_logout_flag().await {
            debug!(reason = %RecoveryReason::LogoutFlag, "recovery skipped");
            return RecoveryOutcome::Failed(RecoveryReason::LogoutFlag);
        }

        let cached = self.record.load().await;
        if let Some(snapshot) = &cached {
            debug!(snapshot_id = %snapshot.snapshot_id, "validating cached identity with server");
            match self.validate().await {
                Ok(user) => return self.confirm(user).await,
                Err(e) if e.is_rejection() => {
                    info!(snapshot_id = %snapshot.snapshot_id, error = %e, "server rejected cached session");
                    self.record.clear().await;
                    return RecoveryOutcome::Failed(RecoveryReason::NoValidSession);
                }
                Err(e) => {
                    warn!(snapshot_id = %snapshot.snapshot_id, error = %e, "cached session not validated; keeping it");
                }
            }
        }

        if self.record.has_logout_flag().await {
            return RecoveryOutcome::Failed(RecoveryReason::LogoutFlag);
        }

        match self.validate().await {
            Ok(user) => self.confirm(user).await,
            Err(e) if e.is_rejection() => {
                match &cached {
                    Some(snapshot) => {
                        info!(snapshot_id = %snapshot.snapshot_id, error = %e, "server rejected cached session on retry");
                        self.record.clear().await;
                    }
                    None => debug!(error = %e, "no server session"),
                }
                RecoveryOutcome::Failed(RecoveryReason::NoValidSession)
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "server unreachable during recovery");
                RecoveryOutcome::Failed(RecoveryReason::ServerUnreachable)
            }
        }
    }

    /// Wipe local state including the logout flag, let in-flight writes
    /// settle, then recover from scratch. Only for explicit user or operator
    /// action.
    pub async fn force_restore(&self) -> RecoveryOutcome {
        info!("force restore requested");
        self.record.clear().await;
        self.record.clear_logout_flag().await;
        if !self.restore_settle.is_zero() {
            tokio::time::sleep(self.restore_settle).await;
        }
        self.attempt_recovery().await
    }

    /// One bounded `GET /api/auth/user`.
    pub(crate) async fn validate(&self) -> Result<UserPayload, AuthError> {
        match tokio::time::timeout(self.request_timeout, self.api.fetch_current_user()).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout),
        }
    }

    async fn confirm(&self, user: UserPayload) -> RecoveryOutcome {
        if self.record.has_logout_flag().await {
            info!("logout recorded while validating; confirmation discarded");
            return RecoveryOutcome::Failed(RecoveryReason::LogoutFlag);
        }

        let snapshot_id = match self.record.save(user.clone(), true).await {
            Ok(snapshot) => Some(snapshot.snapshot_id),
            Err(e) => {
                warn!(error = %e, "confirmed identity not persisted");
                None
            }
        };
        debug!(snapshot_id = ?snapshot_id, "session recovered");
        RecoveryOutcome::Restored { user, snapshot_id }
    }
}

#[cfg(test)]
#[path = "recovery_test.rs"]
mod tests;
