//! Session controller: the single entry point the rest of the app uses.
//!
//! ARCHITECTURE
//! ============
//! The controller owns `AuthState` (published through a `watch` channel),
//! runs initialization at most once per page load, keeps the heartbeat armed
//! exactly while the state is settled and authenticated, and performs logout.
//!
//! CONCURRENCY
//! ===========
//! - Initialization sits behind a `OnceCell`: concurrent callers share one
//!   in-flight recovery and all observe its settled result.
//! - Every operation that writes the record store (initialization, logout,
//!   force-restore, login completion, heartbeat rejection) holds `op_lock`,
//!   so a logout issued mid-recovery queues behind it instead of
//!   interleaving writes.
//! - `generation` advances on every user-visible session action. A result
//!   computed under an older generation is never published, which keeps a
//!   slow recovery from resurrecting a state the user already logged out of.
//! - Each action that settles the state records its `RecoveryOutcome` in the
//!   same step, so `last_outcome` always explains the published state.
//!
//! TRADE-OFFS
//! ==========
//! Logout flips the published state before any I/O and spawns the storage
//! and network work. The UI is always immediately correct; the durable
//! cleanup may lag but runs whether or not the caller awaits it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::heartbeat;
use super::record::SessionRecordStore;
use super::recovery::{RecoveryCoordinator, RecoveryOutcome, RecoveryReason};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::navigation::Navigator;
use crate::net::types::{AuthApi, UserPayload};
use crate::state::auth::AuthState;
use crate::storage::KeyValueStore;

/// External collaborators a controller is wired to.
pub struct SessionDeps {
    /// Shared by every tab of the origin.
    pub durable: Arc<dyn KeyValueStore>,
    /// Private to this tab.
    pub ephemeral: Arc<dyn KeyValueStore>,
    pub api: Arc<dyn AuthApi>,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
}

/// Cheap-to-clone handle. Create one per page load and hand clones to every
/// consumer; all clones share one state, one init guard and one heartbeat.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: SessionConfig,
    record: Arc<SessionRecordStore>,
    recovery: RecoveryCoordinator,
    api: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
    state_tx: watch::Sender<AuthState>,
    init: OnceCell<()>,
    outcome: Mutex<Option<RecoveryOutcome>>,
    op_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.heartbeat.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl SessionController {
    #[must_use]
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let record = Arc::new(SessionRecordStore::new(
            deps.durable,
            deps.ephemeral,
            deps.clock,
            config.session_timeout,
        ));
        let recovery = RecoveryCoordinator::new(Arc::clone(&record), Arc::clone(&deps.api), &config);
        let (state_tx, _) = watch::channel(AuthState::uninitialized());

        Self {
            inner: Arc::new(Inner {
                config,
                record,
                recovery,
                api: deps.api,
                navigator: deps.navigator,
                state_tx,
                init: OnceCell::new(),
                outcome: Mutex::new(None),
                op_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                heartbeat: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current state. The only way consumers read `AuthState`.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn record_store(&self) -> &SessionRecordStore {
        &self.inner.record
    }

    #[must_use]
    pub fn heartbeat_armed(&self) -> bool {
        self.inner
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Outcome behind the current state: the recovery, restore, login,
    /// logout or heartbeat rejection that last settled it. `None` until the
    /// first of those.
    #[must_use]
    pub fn last_outcome(&self) -> Option<RecoveryOutcome> {
        self.inner.outcome.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Advisory check before offering a "continue as…" affordance.
    pub async fn can_attempt_recovery(&self) -> bool {
        self.inner.recovery.can_attempt_recovery().await
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Settle the state for this page load. Safe to call from every
    /// consumer; only the first call does any work.
    pub async fn initialize(&self) -> AuthState {
        self.inner.init.get_or_init(|| self.run_initialization()).await;
        self.state()
    }

    async fn run_initialization(&self) {
        let generation = self.generation();
        let _guard = self.inner.op_lock.lock().await;
        if self.generation() != generation {
            debug!("session changed before initialization started; skipping recovery");
            return;
        }

        match self.inner.record.load().await {
            Some(snapshot) => {
                debug!(snapshot_id = %snapshot.snapshot_id, "painting cached identity while validating");
                self.publish_if_current(generation, AuthState::optimistic(snapshot.user));
            }
            None => debug!("no trusted local snapshot; checking with server"),
        }

        let outcome = self.inner.recovery.attempt_recovery().await;
        debug!(success = outcome.is_success(), reason = ?outcome.reason(), "initialization settled");
        if !self.settle(generation, state_for(&outcome), outcome) {
            debug!("recovery result superseded by a later session action");
        }
    }

    // =========================================================================
    // LOGOUT
    // =========================================================================

    /// Log out. The state is already logged-out when this returns. Local
    /// cleanup (including the logout flag), the best-effort server
    /// notification and the hard navigation to the login page run on a
    /// spawned task, so they happen even if the returned future is dropped;
    /// awaiting it only waits for them. Logout never fails.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn logout(&self) -> BoxFuture<'static, ()> {
        let generation = self.advance_generation();
        self.record_outcome(RecoveryOutcome::Failed(RecoveryReason::LogoutFlag));
        self.publish(AuthState::signed_out());
        info!("logout requested");

        let this = self.clone();
        let cleanup = tokio::spawn(async move { this.finish_logout(generation).await });
        async move {
            if let Err(e) = cleanup.await {
                warn!(error = %e, "logout cleanup task did not finish");
            }
        }
        .boxed()
    }

    async fn finish_logout(&self, generation: u64) {
        let guard = self.inner.op_lock.lock().await;
        if self.generation() != generation {
            debug!("logout superseded by a later session action");
            return;
        }
        self.inner.record.clear().await;
        drop(guard);

        let api = Arc::clone(&self.inner.api);
        let timeout = self.inner.config.request_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, api.logout()).await {
                Ok(Ok(())) => debug!("server logout acknowledged"),
                Ok(Err(e)) => warn!(error = %e, "server logout notification failed; ignored"),
                Err(_) => warn!("server logout notification timed out; ignored"),
            }
        });

        self.inner.navigator.navigate(&self.inner.config.login_path);
    }

    // =========================================================================
    // EXPLICIT RE-AUTHENTICATION
    // =========================================================================

    /// Wipe local state and the logout flag, then recover from scratch.
    /// Only for an explicit "try again" action.
    pub async fn force_restore(&self) -> RecoveryOutcome {
        let _guard = self.inner.op_lock.lock().await;
        let generation = self.advance_generation();

        let outcome = self.inner.recovery.force_restore().await;
        self.settle(generation, state_for(&outcome), outcome.clone());
        info!(success = outcome.is_success(), reason = ?outcome.reason(), "force restore finished");
        outcome
    }

    /// Called by the login flow once the server has issued a session for
    /// `user`. Re-enables recovery and settles as authenticated.
    pub async fn complete_login(&self, user: UserPayload) {
        let _guard = self.inner.op_lock.lock().await;
        let generation = self.advance_generation();

        self.inner.record.clear_logout_flag().await;
        let snapshot_id = match self.inner.record.save(user.clone(), true).await {
            Ok(snapshot) => Some(snapshot.snapshot_id),
            Err(e) => {
                warn!(error = %e, "login identity not persisted; session lasts this page only");
                None
            }
        };
        info!(snapshot_id = ?snapshot_id, "login completed");

        if self.inner.init.set(()).is_err() {
            debug!("initialization already settled; login supersedes it");
        }
        let outcome = RecoveryOutcome::Restored { user: user.clone(), snapshot_id };
        self.settle(generation, AuthState::authenticated(user), outcome);
    }

    /// Clear only the logout flag, for hosts that let a visit to the login
    /// page re-enable silent recovery.
    pub async fn allow_reauthentication(&self) {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.record.clear_logout_flag().await;
    }

    // =========================================================================
    // HEARTBEAT
    // =========================================================================

    /// One liveness re-validation. The armed heartbeat calls this on every
    /// tick; it is public so hosts can also trigger one on tab focus.
    pub async fn heartbeat_tick(&self) -> heartbeat::HeartbeatOutcome {
        use heartbeat::HeartbeatOutcome;

        let generation = self.generation();
        if !self.state().is_settled_authenticated() {
            return HeartbeatOutcome::Skipped;
        }

        match self.inner.recovery.validate().await {
            Ok(_) => {
                let _guard = self.inner.op_lock.lock().await;
                if self.generation() != generation {
                    debug!("heartbeat confirmation superseded by a later session action");
                    return HeartbeatOutcome::Skipped;
                }
                self.inner.record.touch_liveness().await;
                debug!("heartbeat confirmed session");
                HeartbeatOutcome::Alive
            }
            Err(e) if e.is_rejection() => {
                let _guard = self.inner.op_lock.lock().await;
                if self.generation() != generation {
                    return HeartbeatOutcome::Skipped;
                }
                warn!(error = %e, "heartbeat rejected; session ended server-side");
                let generation = self.advance_generation();
                self.inner.record.clear().await;
                // Last step: publishing disarms the heartbeat, which may be
                // the task running this very tick.
                self.settle(
                    generation,
                    AuthState::signed_out(),
                    RecoveryOutcome::Failed(RecoveryReason::NoValidSession),
                );
                HeartbeatOutcome::Rejected
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "heartbeat could not reach server; retrying next tick");
                HeartbeatOutcome::Unreachable
            }
        }
    }

    fn sync_heartbeat(&self) {
        let should_run = self.inner.state_tx.borrow().is_settled_authenticated();
        let mut slot = self.inner.heartbeat.lock().unwrap_or_else(PoisonError::into_inner);

        if should_run {
            if slot.as_ref().is_none_or(JoinHandle::is_finished) {
                let period = self.inner.config.heartbeat_interval;
                debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "heartbeat armed");
                *slot = Some(heartbeat::spawn(self.downgrade(), period));
            }
        } else if let Some(handle) = slot.take() {
            handle.abort();
            debug!("heartbeat disarmed");
        }
    }

    // =========================================================================
    // STATE PUBLICATION
    // =========================================================================

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn advance_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, state: AuthState) {
        self.inner.state_tx.send_replace(state);
        self.sync_heartbeat();
    }

    /// Publish unless a newer session action has happened since `generation`.
    /// The check runs under the channel's write lock, so it cannot interleave
    /// with another publish.
    fn publish_if_current(&self, generation: u64, state: AuthState) -> bool {
        let applied = self.inner.state_tx.send_if_modified(|current| {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state;
            true
        });
        if applied {
            self.sync_heartbeat();
        }
        applied
    }

    fn record_outcome(&self, outcome: RecoveryOutcome) {
        *self.inner.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    /// `publish_if_current` that also records the outcome behind `state`.
    /// Both happen under the channel's write lock or not at all.
    fn settle(&self, generation: u64, state: AuthState, outcome: RecoveryOutcome) -> bool {
        let applied = self.inner.state_tx.send_if_modified(|current| {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state;
            self.record_outcome(outcome);
            true
        });
        if applied {
            self.sync_heartbeat();
        }
        applied
    }
}

fn state_for(outcome: &RecoveryOutcome) -> AuthState {
    match outcome {
        RecoveryOutcome::Restored { user, .. } => AuthState::authenticated(user.clone()),
        RecoveryOutcome::Failed(_) => AuthState::signed_out(),
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
