//! REST helpers for the auth endpoints.
//!
//! The session credential is an http-only cookie the client never reads; the
//! reqwest cookie store carries it on every request the way a browser would.
//!
//! ERROR HANDLING
//! ==============
//! A 200 with a non-null JSON body is the only success. 401/403 become
//! `AuthError::Rejected`; timeouts, connection failures and 5xx stay in the
//! transport class so a flaky network never logs anyone out.

use std::sync::Arc;

use reqwest::header::{CACHE_CONTROL, PRAGMA};

use super::types::{classify_status, AuthApi, AuthError, UserPayload};
use crate::config::SessionConfig;

const USER_PATH: &str = "/api/auth/user";
const LOGOUT_PATH: &str = "/api/auth/logout";

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client with its own cookie store and the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AuthError::Transport(format!("HTTP client build failed: {e}")))?;
        Ok(Self::with_client(&config.api_base_url, http))
    }

    /// Build a client sharing an existing cookie jar (e.g. the one the login
    /// flow populated).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn with_cookie_jar(config: &SessionConfig, jar: Arc<reqwest::cookie::Jar>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AuthError::Transport(format!("HTTP client build failed: {e}")))?;
        Ok(Self::with_client(&config.api_base_url, http))
    }

    #[must_use]
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_owned() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn request_error(e: &reqwest::Error) -> AuthError {
    if e.is_timeout() { AuthError::Timeout } else { AuthError::Transport(e.to_string()) }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn fetch_current_user(&self) -> Result<UserPayload, AuthError> {
        let resp = self
            .http
            .get(self.url(USER_PATH))
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(classify_status(status));
        }

        let user: UserPayload = resp.json().await.map_err(|e| {
            if e.is_timeout() { AuthError::Timeout } else { AuthError::Malformed(e.to_string()) }
        })?;
        if user.is_null() {
            return Err(AuthError::Malformed("null identity payload".into()));
        }
        Ok(user)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let resp = self
            .http
            .post(self.url(LOGOUT_PATH))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(classify_status(resp.status().as_u16()))
        }
    }
}
