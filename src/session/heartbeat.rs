//! Periodic liveness re-validation while a session is settled.
//!
//! The task holds only a `Weak` reference to the controller, so dropping the
//! last controller handle ends it on the next tick even if nobody disarmed it.

use std::sync::Weak;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::controller::{Inner, SessionController};

/// Result of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatOutcome {
    /// Server confirmed the session; liveness marker refreshed.
    Alive,
    /// Server could not be asked. Nothing changed; retried next tick.
    Unreachable,
    /// Server rejected the session; state is now logged-out.
    Rejected,
    /// Not settled-authenticated, or superseded by another session action.
    Skipped,
}

impl HeartbeatOutcome {
    fn keeps_running(self) -> bool {
        matches!(self, Self::Alive | Self::Unreachable)
    }
}

/// Spawn the heartbeat loop. First tick fires one `period` after arming.
pub(crate) fn spawn(controller: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    // `interval_at` panics on a zero period.
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(inner) = controller.upgrade() else {
                debug!("controller dropped; heartbeat exiting");
                break;
            };
            let outcome = SessionController::from_inner(inner).heartbeat_tick().await;
            if !outcome.keeps_running() {
                debug!(?outcome, "heartbeat stopping");
                break;
            }
        }
    })
}
