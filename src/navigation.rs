//! Hard navigation hook.
//!
//! Logout ends with a full navigation to the login surface so that no stale
//! in-memory state from the rest of the application survives. The page shell
//! owns navigation; the session layer only asks for it.

/// Performs a full (non-client-side) navigation to `path`.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}
