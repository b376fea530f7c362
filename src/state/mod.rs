//! In-memory, UI-facing state.
//!
//! Nothing here is persisted; the session controller is the only writer.

pub mod auth;
