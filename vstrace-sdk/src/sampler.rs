//! Cancellable background occupancy sampler.
//!
//! Ticks on a fixed interval, reads the store's current length, and reports
//! `(occupancy, occupancy/capacity)` through an [`Observer`] as well as a
//! structured log line. Cancellation (dropping the returned handle, or
//! calling [`SamplerHandle::stop`]) must stop the ticker promptly; it never
//! blocks on an in-flight tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use vstrace_api::Observer;

use crate::store::SpanStore;

/// Handle to a running sampler task. Dropping it (or calling `stop`) signals
/// the task to exit; it does not block waiting for the task to finish.
pub struct SamplerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Signals the sampler to stop and waits for its task to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Spawns a sampler that reports `store`'s occupancy under `buffer_name`
/// every `interval`.
pub fn spawn(
    buffer_name: &'static str,
    store: Arc<SpanStore>,
    observer: Arc<dyn Observer>,
    interval: Duration,
) -> SamplerHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let len = store.len();
                    let capacity = store.capacity();
                    observer.record_occupancy(buffer_name, len, capacity);
                    tracing::debug!(buffer = buffer_name, occupancy = len, capacity, "span store occupancy sample");
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    SamplerHandle { stop_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstrace_api::NoopObserver;

    #[tokio::test]
    async fn stop_returns_promptly() {
        let store = Arc::new(SpanStore::new(10));
        let observer: Arc<dyn Observer> = Arc::new(NoopObserver);
        let handle = spawn("spans", store, observer, Duration::from_secs(3600));
        let started = tokio::time::Instant::now();
        handle.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
