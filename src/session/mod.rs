pub mod controller;
pub mod heartbeat;
pub mod record;
pub mod recovery;
pub mod snapshot;
