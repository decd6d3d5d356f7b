//! Periodic expiry of unconfirmed transactions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::relay::service::RelayService;
use crate::relay::types::unix_now;

/// Drives [`RelayService::expire_sweep`] on an interval and snapshots the
/// store after every pass.
pub struct ExpirySweeper {
    service: Arc<RelayService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<RelayService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiry sweeper starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Expiry sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let expired = self.service.expire_sweep(unix_now()).await;
        if expired > 0 {
            tracing::info!(expired, "Expired unconfirmed transactions");
        }
        if let Err(e) = self.service.persist() {
            tracing::error!(error = %e, "Failed to persist transaction store");
        }
    }
}
