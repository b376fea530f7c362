//! Auth boundary types: identity payload, failure taxonomy, client trait.

/// Identity payload as returned by `GET /api/auth/user`. Opaque to this crate
/// beyond being non-null.
pub type UserPayload = serde_json::Value;

// =============================================================================
// ERROR
// =============================================================================

/// Outcome of a failed validation or logout request.
///
/// Only [`AuthError::Rejected`] is a definitive "not logged in"; every other
/// variant means "could not tell" and must not end a session by itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The server answered and denied the credential.
    #[error("authentication rejected: status {status}")]
    Rejected { status: u16 },

    /// The server answered with a transient failure (5xx, 408, 429).
    #[error("auth server error: status {status}")]
    Server { status: u16 },

    /// No answer within the request timeout.
    #[error("auth request timed out")]
    Timeout,

    /// The request never produced a response.
    #[error("auth request failed: {0}")]
    Transport(String),

    /// A 200 response whose body was not a usable identity.
    #[error("auth response malformed: {0}")]
    Malformed(String),
}

impl AuthError {
    /// True when the server explicitly denied the session.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Stable short code for structured logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Server { .. } => "server_error",
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Map a non-200 status to the failure class it represents.
///
/// Anything the server answers with is "not authenticated" except statuses
/// that say the server itself could not decide right now.
#[must_use]
pub fn classify_status(status: u16) -> AuthError {
    match status {
        408 | 429 | 500..=599 => AuthError::Server { status },
        _ => AuthError::Rejected { status },
    }
}

// =============================================================================
// AUTH API TRAIT
// =============================================================================

/// Server auth endpoints. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `GET /api/auth/user`: who does the ambient cookie belong to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] on 401/403 (and other definitive
    /// refusals), or a transport-class [`AuthError`] when no decision was made.
    async fn fetch_current_user(&self) -> Result<UserPayload, AuthError>;

    /// `POST /api/auth/logout`: best-effort server notification.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the notification could not be delivered.
    /// Callers log and otherwise ignore it.
    async fn logout(&self) -> Result<(), AuthError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
