//! Server boundary: the auth endpoints this layer consumes.
//!
//! `types` holds the provider-neutral trait and errors; `api` is the reqwest
//! implementation talking to `/api/auth/*` with an ambient cookie jar.

pub mod api;
pub mod types;
