//! Periodic cleanup of read notifications and sent emails.

use std::sync::Arc;
use std::time::Duration;

use agora_db::store::{DeliveryStore, StoreError};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Counts removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub notifications: u64,
    pub emails: u64,
}

/// Shortest sweep period; `tokio::time::interval` rejects zero.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Longest retention period accepted, in days.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

pub struct RetentionPurger {
    store: Arc<dyn DeliveryStore>,
    interval: Duration,
    retention: chrono::Duration,
}

impl RetentionPurger {
    /// `interval` is raised to [`MIN_PURGE_INTERVAL`] and `retention` is
    /// clamped to `0..=MAX_RETENTION_DAYS` days.
    pub fn new(store: Arc<dyn DeliveryStore>, interval: Duration, retention: chrono::Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_PURGE_INTERVAL),
            retention: retention.clamp(chrono::Duration::zero(), chrono::Duration::days(MAX_RETENTION_DAYS)),
        }
    }

    /// Delete read notifications and sent emails older than the retention period.
    pub async fn purge_once(&self) -> Result<PurgeReport, StoreError> {
        let cutoff = Utc::now() - self.retention;
        Ok(PurgeReport {
            notifications: self.store.purge_read_notifications(cutoff).await?,
            emails: self.store.purge_sent_emails(cutoff).await?,
        })
    }

    /// Sweep every `interval` until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            retention_days = self.retention.num_days(),
            interval_secs = self.interval.as_secs(),
            "Notification purger started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Notification purger stopping");
                    break;
                }
                _ = interval.tick() => match self.purge_once().await {
                    Ok(report) if report != PurgeReport::default() => {
                        tracing::info!(
                            notifications = report.notifications,
                            emails = report.emails,
                            "Purged old rows"
                        );
                    }
                    Ok(_) => tracing::debug!("Nothing to purge"),
                    Err(e) => tracing::error!(error = %e, "Purge failed"),
                },
            }
        }
    }
}
