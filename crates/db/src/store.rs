//! Narrow persistence traits consumed by the event and worker crates.
//!
//! Each trait covers one concern so that a consumer only depends on what it
//! touches. [`crate::PgStore`] implements all of them against Postgres and
//! [`crate::MemoryStore`] implements them in-process.

use std::collections::BTreeMap;

use agora_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::models::audit::NewAuditEntry;
use crate::models::notification::NewNotification;
use crate::models::pending_email::{NewPendingEmail, PendingEmail};
use crate::models::user::{Preferences, UserContact};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmailOutbox: Send + Sync {
    async fn enqueue_email(&self, email: &NewPendingEmail) -> StoreResult<DbId>;

    /// Oldest unsent email.
    async fn next_pending_email(&self) -> StoreResult<Option<PendingEmail>>;

    /// Increment the error counter, returning the new value.
    async fn record_email_failure(&self, id: DbId) -> StoreResult<i32>;

    async fn mark_email_sent(&self, id: DbId) -> StoreResult<()>;

    async fn delete_pending_email(&self, id: DbId) -> StoreResult<()>;

    /// Delete sent emails older than `cutoff`.
    async fn purge_sent_emails(&self, cutoff: Timestamp) -> StoreResult<u64>;
}

// ---------------------------------------------------------------------------
// Notifications and subscriptions
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<DbId>;

    /// Creation time of the newest notification for `user_id` with exactly
    /// `message`. Read notifications are skipped when `unread_only` is set.
    async fn latest_notification_at(
        &self,
        user_id: DbId,
        message: &str,
        unread_only: bool,
    ) -> StoreResult<Option<Timestamp>>;

    /// Delete read notifications older than `cutoff`.
    async fn purge_read_notifications(&self, cutoff: Timestamp) -> StoreResult<u64>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Distinct users holding any of `patterns` for `method`, ascending.
    async fn list_subscribers(&self, patterns: &[String], method: &str) -> StoreResult<Vec<DbId>>;

    /// Idempotent insert; `true` when a new row was created.
    async fn add_subscription(&self, user_id: DbId, pattern: &str, method: &str)
        -> StoreResult<bool>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_contact(&self, user_id: DbId) -> StoreResult<Option<UserContact>>;

    async fn user_id_by_email(&self, email: &str) -> StoreResult<Option<DbId>>;

    async fn is_verified_address(&self, email: &str) -> StoreResult<bool>;

    /// Verified addresses of administrator accounts.
    async fn admin_emails(&self) -> StoreResult<Vec<String>>;

    /// Stored preferences, or the defaults when the user has none.
    async fn preferences(&self, user_id: DbId) -> StoreResult<Preferences>;
}

// ---------------------------------------------------------------------------
// Worker side effects
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, entry: &NewAuditEntry) -> StoreResult<DbId>;
}

#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Replace the indexed words of one document.
    async fn index_document(
        &self,
        kind: &str,
        id: DbId,
        counts: &BTreeMap<String, i32>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait ContentStatsStore: Send + Sync {
    /// `false` when the thread does not exist.
    async fn recount_thread(&self, thread_id: DbId) -> StoreResult<bool>;

    /// `false` when the topic does not exist.
    async fn recount_topic(&self, topic_id: DbId) -> StoreResult<bool>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn insert_dead_letter(&self, message: &str) -> StoreResult<DbId>;

    async fn count_dead_letters(&self) -> StoreResult<i64>;
}

/// Everything the notifier and the email queue need.
pub trait DeliveryStore:
    EmailOutbox + NotificationStore + SubscriptionStore + UserDirectory + DeadLetterStore
{
}

impl<T> DeliveryStore for T where
    T: EmailOutbox + NotificationStore + SubscriptionStore + UserDirectory + DeadLetterStore
{
}
