//! Graceful shutdown: wait for SIGINT/SIGTERM, stop accepting connections,
//! drain for a fixed window, then flush every tracer's closer.
//!
//! Mirrors the original's `waitForShutdown`: block on the interrupt signal,
//! then shut down under a deadline rather than waiting indefinitely for
//! in-flight requests.

use std::time::Duration;

use tokio::sync::oneshot;

/// Returns a future that resolves once SIGINT or SIGTERM arrives.
pub fn signal() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    // ctrlc's handler runs on its own thread and may fire more than once if
    // signaled twice; only the first send matters, so a lost second send is fine.
    let tx = std::sync::Mutex::new(Some(tx));
    ctrlc::set_handler(move || {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    })
    .expect("failed to install signal handler");
    rx
}

/// Sleeps for `drain` to give in-flight requests a chance to finish after
/// the listener stops accepting new connections.
pub async fn drain(drain: Duration) {
    tracing::info!(drain_ms = drain.as_millis() as u64, "draining in-flight requests");
    tokio::time::sleep(drain).await;
}
