use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ConnectionRegistry;

/// Run [`ConnectionRegistry::heartbeat_tick`] every `interval` until
/// `shutdown` changes.
pub fn spawn_heartbeat_task(
    registry: ConnectionRegistry,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = registry.heartbeat_tick().await;
                    debug!(
                        pinged = report.pinged,
                        reaped = report.reaped,
                        skipped = report.skipped,
                        "Heartbeat tick"
                    );
                }
                _ = shutdown.changed() => {
                    info!("Heartbeat task shutting down");
                    return;
                }
            }
        }
    })
}
