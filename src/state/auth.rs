#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use crate::net::types::UserPayload;

/// Named position in the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Not settled and nothing to show. Covers both a freshly created
    /// controller and recovery in flight without a local snapshot; the two
    /// carry identical fields.
    Uninitialized,
    /// Not settled, showing a locally cached identity while the server check
    /// runs.
    Optimistic,
    Authenticated,
    Unauthenticated,
}

/// Authentication state tracking the current user and loading status.
///
/// Invariants: `initialized` implies `!is_loading`, and `is_authenticated`
/// implies `user.is_some()`. The constructors below are the only way the
/// controller builds values, so both hold by construction.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthState {
    pub user: Option<UserPayload>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub initialized: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl AuthState {
    /// State at controller creation.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self { user: None, is_authenticated: false, is_loading: true, initialized: false }
    }

    /// Painted from a local snapshot while the server check is still in
    /// flight, so it is still loading.
    #[must_use]
    pub fn optimistic(user: UserPayload) -> Self {
        Self { user: Some(user), is_authenticated: true, is_loading: true, initialized: false }
    }

    #[must_use]
    pub fn authenticated(user: UserPayload) -> Self {
        Self { user: Some(user), is_authenticated: true, is_loading: false, initialized: true }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None, is_authenticated: false, is_loading: false, initialized: true }
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        match (self.initialized, self.is_authenticated) {
            (true, true) => AuthPhase::Authenticated,
            (true, false) => AuthPhase::Unauthenticated,
            (false, true) => AuthPhase::Optimistic,
            (false, false) => AuthPhase::Uninitialized,
        }
    }

    /// True once recovery has settled and the heartbeat should run.
    #[must_use]
    pub fn is_settled_authenticated(&self) -> bool {
        self.initialized && self.is_authenticated
    }
}
