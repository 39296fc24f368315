use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cache::ResponseCache,
    metrics::{MetricsCollector, MetricsSnapshot, ProcessUsage},
};

/// Periodic cache sweep + metrics log.
///
/// Purely a memory-reclamation and observability task: the cache already
/// treats expired entries as misses on read.
#[derive(Clone)]
pub struct Janitor {
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsCollector>,
    period: Duration,
}

impl Janitor {
    pub fn new(cache: Arc<ResponseCache>, metrics: Arc<MetricsCollector>, period: Duration) -> Self {
        Self {
            cache,
            metrics,
            period,
        }
    }

    /// One janitor pass. Returns the number of evicted entries and the snapshot it logged.
    pub async fn tick(&self) -> (usize, MetricsSnapshot) {
        let removed = self.cache.sweep();
        let remaining = self.cache.len();
        if removed > 0 {
            info!(removed, remaining, "swept expired cache entries");
        } else {
            debug!(remaining, "cache sweep found nothing to evict");
        }

        let snapshot = self.metrics.snapshot();
        snapshot.log("periodic", &ProcessUsage::sample().await);
        (removed, snapshot)
    }

    /// Run [`Janitor::tick`] every period until `cancel` fires.
    ///
    /// The first pass happens one full period after spawning.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.period;
            let mut tick = tokio::time::interval_at(start, self.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                    self.tick().await;
                  }
                }
            }
            debug!("janitor stopped");
        })
    }
}
