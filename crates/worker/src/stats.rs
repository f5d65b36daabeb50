//! Periodic dump of event bus counters.

use std::sync::Arc;
use std::time::Duration;

use agora_events::bus::{BusStatsSnapshot, EventBus};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

/// Shortest reporting period; `interval_at` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct BusStatsReporter {
    bus: Arc<EventBus>,
    interval: Duration,
}

impl BusStatsReporter {
    pub fn new(bus: Arc<EventBus>, interval: Duration) -> Self {
        Self {
            bus,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Log the current counters and return them.
    pub fn report(&self) -> BusStatsSnapshot {
        let snapshot = self.bus.stats();
        for (kind, stats) in &snapshot.kinds {
            if stats.dropped > 0 {
                tracing::warn!(
                    kind = %kind,
                    published = stats.published,
                    dropped = stats.dropped,
                    subscribers = stats.subscribers,
                    "Bus stats"
                );
            } else {
                tracing::info!(
                    kind = %kind,
                    published = stats.published,
                    subscribers = stats.subscribers,
                    "Bus stats"
                );
            }
        }
        snapshot
    }

    /// Report every `interval` until cancelled, and once more on the way out.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
        self.report();
        tracing::info!("Bus stats reporter stopped");
    }
}
