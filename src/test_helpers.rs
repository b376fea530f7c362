//! Shared fixtures for unit tests: scripted server, failing store, harness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::ManualClock;
use crate::config::SessionConfig;
use crate::navigation::Navigator;
use crate::net::types::{AuthApi, AuthError, UserPayload};
use crate::session::controller::{SessionController, SessionDeps};
use crate::session::record::SessionRecordStore;
use crate::session::recovery::RecoveryCoordinator;
use crate::storage::{KeyValueStore, MemoryStore, StorageError};

/// 2023-11-14T22:13:20Z
pub(crate) const T0: i64 = 1_700_000_000_000;

pub(crate) fn member(id: u64) -> UserPayload {
    serde_json::json!({ "id": id, "name": format!("member-{id}"), "roles": ["member"] })
}

// =============================================================================
// ScriptedApi
// =============================================================================

/// `AuthApi` double: answers from a script, then from a fallback.
pub(crate) struct ScriptedApi {
    script: Mutex<VecDeque<Result<UserPayload, AuthError>>>,
    fallback: Mutex<Result<UserPayload, AuthError>>,
    logout_result: Mutex<Result<(), AuthError>>,
    delay: Mutex<Duration>,
    hang: AtomicBool,
    user_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl ScriptedApi {
    pub(crate) fn confirming(user: UserPayload) -> Arc<Self> {
        Arc::new(Self::with_fallback(Ok(user)))
    }

    pub(crate) fn rejecting(status: u16) -> Arc<Self> {
        Arc::new(Self::with_fallback(Err(AuthError::Rejected { status })))
    }

    pub(crate) fn unreachable() -> Arc<Self> {
        Arc::new(Self::with_fallback(Err(AuthError::Transport("connection refused".into()))))
    }

    fn with_fallback(fallback: Result<UserPayload, AuthError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            logout_result: Mutex::new(Ok(())),
            delay: Mutex::new(Duration::ZERO),
            hang: AtomicBool::new(false),
            user_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a one-shot answer ahead of the fallback.
    pub(crate) fn push(&self, answer: Result<UserPayload, AuthError>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub(crate) fn set_fallback(&self, answer: Result<UserPayload, AuthError>) {
        *self.fallback.lock().unwrap() = answer;
    }

    pub(crate) fn set_logout_result(&self, result: Result<(), AuthError>) {
        *self.logout_result.lock().unwrap() = result;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Never answer `fetch_current_user`.
    pub(crate) fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub(crate) fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuthApi for ScriptedApi {
    async fn fetch_current_user(&self) -> Result<UserPayload, AuthError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_result.lock().unwrap().clone()
    }
}

// =============================================================================
// FailingStore
// =============================================================================

/// Store that refuses everything, like storage in a locked-down private window.
pub(crate) struct FailingStore;

#[async_trait::async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

// =============================================================================
// RecordingNavigator
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_owned());
    }
}

// =============================================================================
// Harness
// =============================================================================

/// One browser profile: a durable store, a clock, a server, and one tab's
/// ephemeral store. `new_tab` opens another tab on the same profile.
pub(crate) struct Harness {
    pub(crate) durable: Arc<MemoryStore>,
    pub(crate) ephemeral: Arc<MemoryStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) api: Arc<ScriptedApi>,
    pub(crate) navigator: Arc<RecordingNavigator>,
    pub(crate) config: SessionConfig,
}

impl Harness {
    pub(crate) fn new(api: Arc<ScriptedApi>) -> Self {
        let config = SessionConfig {
            request_timeout: Duration::from_millis(200),
            restore_settle: Duration::from_millis(1),
            ..SessionConfig::default()
        };
        Self {
            durable: Arc::new(MemoryStore::new()),
            ephemeral: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(T0)),
            api,
            navigator: Arc::new(RecordingNavigator::default()),
            config,
        }
    }

    pub(crate) fn new_tab(&self) -> Self {
        Self {
            durable: Arc::clone(&self.durable),
            ephemeral: Arc::new(MemoryStore::new()),
            clock: Arc::clone(&self.clock),
            api: Arc::clone(&self.api),
            navigator: Arc::new(RecordingNavigator::default()),
            config: self.config.clone(),
        }
    }

    pub(crate) fn record_store(&self) -> Arc<SessionRecordStore> {
        Arc::new(SessionRecordStore::new(
            self.durable.clone(),
            self.ephemeral.clone(),
            self.clock.clone(),
            self.config.session_timeout,
        ))
    }

    pub(crate) fn coordinator(&self) -> RecoveryCoordinator {
        RecoveryCoordinator::new(self.record_store(), self.api.clone(), &self.config)
    }

    pub(crate) fn controller(&self) -> SessionController {
        SessionController::new(
            self.config.clone(),
            SessionDeps {
                durable: self.durable.clone(),
                ephemeral: self.ephemeral.clone(),
                api: self.api.clone(),
                navigator: self.navigator.clone(),
                clock: self.clock.clone(),
            },
        )
    }
}
