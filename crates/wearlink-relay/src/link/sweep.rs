use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LinkService;

/// Purge expired link tokens every `interval` until `shutdown` changes.
pub fn spawn_link_sweep_task(
    service: LinkService,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match service.sweep_expired().await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "Purged expired link tokens"),
                        Err(e) => warn!(error = %e, "Link token sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Link sweep task shutting down");
                    return;
                }
            }
        }
    })
}
