//! Picks up out-of-band edits to the knowledge document.

use super::router::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Polls the backing document's checksum every `interval`.
///
/// When the document changed behind the service's back, reloads it and
/// announces any new keywords. A zero interval disables the watcher.
pub async fn watch_knowledge(
    router: Arc<Router>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if interval.is_zero() {
        tracing::info!("Knowledge document watcher disabled");
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; the document was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if router.knowledge().has_external_changes() {
                    tracing::info!("Knowledge document changed on disk");
                    let (new_keys, delivered) = router.reload_and_announce().await;
                    tracing::info!(new_keys = new_keys.len(), delivered, "External change applied");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            },
        }
    }
    tracing::debug!("Knowledge document watcher stopped");
}
