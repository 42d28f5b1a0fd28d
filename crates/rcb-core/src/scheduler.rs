//! Periodic push cycles.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{errors::Error, feed::FeedTracker};

/// Runs [`FeedTracker::push_new`] on a fixed interval until cancelled.
///
/// The first cycle runs immediately. A cycle that overruns the interval delays
/// the next tick instead of bursting.
pub struct PushScheduler {
    feed: Arc<FeedTracker>,
    every: Duration,
}

impl PushScheduler {
    pub fn new(feed: Arc<FeedTracker>, every: Duration) -> Self {
        Self { feed, every }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(every_secs = self.every.as_secs(), "push scheduler started");
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // A cycle in progress finishes even if cancellation arrives meanwhile.
                self.run_once().await;
            }
            info!("push scheduler stopped");
        })
    }

    /// One cycle; failures are logged and retried on the next tick.
    pub async fn run_once(&self) -> Option<usize> {
        match self.feed.push_new().await {
            Ok(n) => {
                debug!(delivered = n, "scheduled push finished");
                Some(n)
            }
            Err(Error::CredentialsMissing) => {
                warn!("no FIB API credentials yet; send /login to authorize");
                None
            }
            Err(e) if e.requires_reauthorization() => {
                warn!(error = %e, "FIB API rejected the stored credentials; send /login again");
                None
            }
            Err(e) => {
                error!(error = %e, "scheduled push failed");
                None
            }
        }
    }
}
