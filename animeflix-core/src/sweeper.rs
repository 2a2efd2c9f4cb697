use std::sync::Arc;
use std::time::Duration;

use animeflix_model::SweepReport;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::ContentStore;

/// Thresholds for [`ContentStore::retention_sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub min_access_count: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            min_access_count: 5,
        }
    }
}

/// Background retention sweeper. Runs until its handle is aborted.
#[derive(Debug)]
pub struct RetentionSweeper {
    store: Arc<ContentStore>,
    policy: RetentionPolicy,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<ContentStore>, policy: RetentionPolicy, interval: Duration) -> Self {
        Self {
            store,
            policy,
            interval,
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport> {
        self.store
            .retention_sweep(self.policy.max_age, self.policy.min_access_count)
            .await
    }

    /// Start the background sweep task
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(report) => debug!(
                        deleted = report.deleted_count,
                        freed_bytes = report.freed_bytes,
                        "scheduled retention sweep"
                    ),
                    Err(e) => warn!("Retention sweep failed: {}", e),
                }
            }
        })
    }
}
