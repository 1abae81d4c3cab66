//! Periodic task runner
//!
//! Each `Periodic` owns one tokio task that runs its job on a fixed interval.
//! The job is awaited inline, so a slow cycle swallows the ticks it overran
//! instead of queueing them.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Periodic {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Periodic {
    /// Start running `job` every `every`. The first run happens immediately.
    ///
    /// Cancellation is observed between runs; a job already running is
    /// allowed to finish.
    pub fn spawn<F, Fut>(name: &'static str, every: Duration, cancel: CancellationToken, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("{} loop started (every {:?})", name, every);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        job().await;
                        let elapsed = started.elapsed();
                        if elapsed > every {
                            tracing::debug!(
                                "{} cycle took {:?}, longer than its {:?} interval; missed ticks coalesced",
                                name, elapsed, every
                            );
                        }
                    }
                }
            }

            tracing::info!("{} loop stopped", name);
        });

        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the loop to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!("{} loop ended abnormally: {}", self.name, e);
        }
    }
}
