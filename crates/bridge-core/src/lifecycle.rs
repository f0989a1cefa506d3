use std::sync::Arc;

use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error};

use crate::{dispatcher::RelayDispatcher, domain::NormalizedEvent};

/// Entry point adapters hand inbound events to.
///
/// Every event runs as its own task on a shared tracker so shutdown can wait for
/// in-flight relays (and their cleanup) to finish. Once the shutdown token is
/// cancelled, new events are refused.
#[derive(Clone)]
pub struct Intake {
    dispatcher: Arc<RelayDispatcher>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Intake {
    pub fn new(dispatcher: Arc<RelayDispatcher>, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Spawn a relay task for `event`. Returns false if shutdown has begun.
    pub fn submit(&self, event: NormalizedEvent) -> bool {
        if self.shutdown.is_cancelled() {
            debug!(origin = %event.origin, "shutting down, event dropped");
            return false;
        }

        let dispatcher = self.dispatcher.clone();
        self.tracker.spawn(async move {
            // Run in a nested task so a panic is reported here instead of
            // silently tearing down the tracked task.
            let origin = event.origin;
            let relay = tokio::spawn(async move { dispatcher.handle(event).await });
            if let Err(e) = relay.await {
                error!(%origin, "relay task failed: {e}");
            }
        });
        true
    }

    /// Number of relays still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting events and wait for in-flight relays to finish.
    pub async fn drain(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
