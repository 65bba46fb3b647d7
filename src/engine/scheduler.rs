// Recurring timer loop around CollectionEngine::run_cycle.
// First tick fires immediately. Shutdown is checked before every tick and interrupts the
// wait; a cycle already running is awaited to completion so its lease gets released.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{MissedTickBehavior, interval};

use super::CollectionEngine;

pub fn spawn(
    engine: CollectionEngine,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = period.as_secs(), "collection loop started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    tracing::info!("collection loop shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = engine.run_cycle().await {
                        tracing::error!(error = %e, "collection cycle failed");
                    }
                }
            }
        }
    })
}
