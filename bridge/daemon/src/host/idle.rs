//! Idle watchdog
//!
//! Fires when no inbound command has been seen for a whole timeout period.
//! Activity is observed through a bus interceptor, so every command counts,
//! including ones no consumer was waiting for.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::CommandBus;
use tokio::sync::Notify;
use tracing::debug;

use super::ExitSignal;

/// Watches inbound traffic and reports prolonged silence
#[derive(Debug)]
pub struct IdleWatchdog {
    activity: Arc<Notify>,
    timeout: Duration,
}

impl IdleWatchdog {
    /// Install the activity interceptor on `bus`
    pub fn install(bus: &CommandBus, timeout: Duration) -> Self {
        let activity = Arc::new(Notify::new());
        let observed = Arc::clone(&activity);
        bus.add_interceptor(move |_| observed.notify_one());

        Self { activity, timeout }
    }

    /// Idle period after which the watchdog fires
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until the idle period elapses or an exit is requested elsewhere
    ///
    /// Returns true if the watchdog fired.
    pub async fn run(self, exit: ExitSignal) -> bool {
        loop {
            tokio::select! {
                _ = exit.wait() => return false,
                seen = tokio::time::timeout(self.timeout, self.activity.notified()) => {
                    if seen.is_err() {
                        return true;
                    }
                    debug!("Inbound activity, idle timer reset");
                }
            }
        }
    }
}
