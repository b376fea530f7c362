//! # session-keeper
//!
//! Client-side session persistence and recovery for the community web app.
//! The server keeps an opaque cookie session the client cannot inspect; this
//! crate reconstructs "am I logged in, and as whom" on every page load from a
//! cached identity snapshot, an authoritative server check, and a durable
//! logout negative-cache.
//!
//! LAYERS
//! ======
//! - `storage`: durable and ephemeral key/value backends.
//! - `session::record`: the only reader/writer of persisted identity state.
//! - `session::recovery`: ordered recovery attempts (local, server, fallback).
//! - `session::controller`: the UI-facing entry point owning `AuthState`,
//!   initialization, the heartbeat, and logout.
//!
//! Everything is wired by explicit construction; there are no globals.

pub mod clock;
pub mod config;
pub mod navigation;
pub mod net;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use navigation::Navigator;
pub use net::api::HttpAuthApi;
pub use net::types::{AuthApi, AuthError, UserPayload};
pub use session::controller::{SessionController, SessionDeps};
pub use session::heartbeat::HeartbeatOutcome;
pub use session::record::{SessionDiagnostics, SessionRecordStore};
pub use session::recovery::{RecoveryCoordinator, RecoveryOutcome, RecoveryReason};
pub use session::snapshot::IdentitySnapshot;
pub use state::auth::{AuthPhase, AuthState};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
