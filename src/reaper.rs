//! Timeout/cleanup reaper
//!
//! Background loop with two periodic passes: roll back transactions whose
//! deadline has elapsed, and purge terminal records past the retention
//! window. Both passes go through the coordinator, so they take the same
//! per-record locks as live calls and are safe to run alongside them.

use crate::config::ReaperConfig;
use crate::txn::TransactionCoordinator;

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

pub struct TransactionReaper {
    coordinator: Arc<TransactionCoordinator>,
    config: ReaperConfig,
    shutdown: Arc<RwLock<bool>>,
}

impl TransactionReaper {
    pub fn new(coordinator: Arc<TransactionCoordinator>, config: ReaperConfig) -> Self {
        Self {
            coordinator,
            config,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Main reaper loop. Runs until `stop` is called.
    pub async fn run(&self) {
        let mut reap_interval = interval(Duration::from_secs(self.config.reap_interval_secs));
        let mut cleanup_interval =
            interval(Duration::from_secs(self.config.cleanup_interval_secs));

        info!(
            reap_interval_secs = self.config.reap_interval_secs,
            cleanup_interval_secs = self.config.cleanup_interval_secs,
            "transaction reaper started"
        );

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = reap_interval.tick() => {
                    let reaped = self.coordinator.reap_expired().await;
                    if reaped > 0 {
                        info!(reaped, "rolled back expired transactions");
                    }
                }

                _ = cleanup_interval.tick() => {
                    let purged = self.coordinator.cleanup_old_transactions().await;
                    if purged > 0 {
                        debug!(purged, "cleanup pass removed terminal records");
                    }
                }
            }
        }

        info!("transaction reaper stopped");
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("transaction reaper shutdown initiated");
    }
}
