use super::{Platform, PlatformEvent};
use crate::config::ReliabilityConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `(initial, max)` reconnect backoff in seconds, never below one second.
pub fn backoff_settings(reliability: &ReliabilityConfig) -> (u64, u64) {
    let initial = reliability.listener_initial_backoff_secs.max(1);
    let max = reliability.listener_max_backoff_secs.max(initial);
    (initial, max)
}

/// Keep `platform.listen` running, restarting it with exponential backoff
/// until `cancel` fires or the event receiver is dropped.
pub fn spawn_supervised_listener(
    platform: Arc<dyn Platform>,
    tx: tokio::sync::mpsc::Sender<PlatformEvent>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let name = platform.name().to_string();
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            tracing::debug!(platform = %name, "listener starting");
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = platform.listen(tx.clone()) => result,
            };

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!(platform = %name, "listener exited; restarting");
                    // A clean exit means the session was healthy.
                    backoff = initial_backoff_secs.max(1);
                }
                Err(e) => {
                    tracing::error!(platform = %name, error = %format!("{e:#}"), "listener failed; restarting");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(backoff)) => {}
            }
            // Double AFTER sleeping so the first failure waits the initial backoff.
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }

        tracing::info!(platform = %name, "listener supervisor stopped");
    })
}
