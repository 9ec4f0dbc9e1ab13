use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, warn};

/// Cap on how long a worker is given to finish in-flight work after a shutdown signal.
pub const SHUTDOWN_CAP: Duration = Duration::from_secs(10);

/// Creates a shutdown channel. The sender is driven by the signal listener; every consumer
/// loop holds a cloned receiver and checks it at each suspension point.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Flips the shutdown flag. Idempotent.
pub fn request(tx: &watch::Sender<bool>) {
    let _ = tx.send(true);
}

/// `true` once shutdown has been requested.
pub fn is_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Spawns a task that listens for ctrl-c (and SIGTERM on unix) and requests shutdown.
pub fn install_signal_handler(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        warn!("shutdown signal received");
        request(&tx);
    });
}

/// Runs `fut` to completion, capping only the drain *after* a shutdown signal is observed.
///
/// `fut` itself already honors `shutdown_rx` and returns once it has drained in-flight work, so
/// normal operation before a signal runs unbounded — only the post-signal wind-down is bounded
/// by `SHUTDOWN_CAP`, with exceeding it treated as a shutdown overrun (exit code 1 per §6).
pub async fn with_shutdown_cap<F, T>(fut: F, mut shutdown_rx: watch::Receiver<bool>) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::pin!(fut);
    tokio::select! {
        out = &mut fut => return Some(out),
        _ = shutdown_rx.changed() => {}
    }
    match tokio::time::timeout(SHUTDOWN_CAP, fut).await {
        Ok(v) => Some(v),
        Err(_) => {
            error!("shutdown exceeded {:?} cap", SHUTDOWN_CAP);
            None
        }
    }
}
