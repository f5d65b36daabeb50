//! Postgres implementation of the store traits.

use std::collections::BTreeMap;

use agora_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::models::audit::NewAuditEntry;
use crate::models::notification::NewNotification;
use crate::models::pending_email::{NewPendingEmail, PendingEmail};
use crate::models::user::{Preferences, UserContact};
use crate::repositories::{
    AuditLogRepo, ContentStatsRepo, DeadLetterRepo, NotificationRepo, PendingEmailRepo,
    SearchRepo, SubscriptionRepo, UserRepo,
};
use crate::store::{
    AuditStore, ContentStatsStore, DeadLetterStore, EmailOutbox, NotificationStore,
    SearchStore, StoreResult, SubscriptionStore, UserDirectory,
};
use crate::DbPool;

/// Store backed by a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl EmailOutbox for PgStore {
    async fn enqueue_email(&self, email: &NewPendingEmail) -> StoreResult<DbId> {
        Ok(PendingEmailRepo::insert(&self.pool, email).await?)
    }

    async fn next_pending_email(&self) -> StoreResult<Option<PendingEmail>> {
        Ok(PendingEmailRepo::next_unsent(&self.pool).await?)
    }

    async fn record_email_failure(&self, id: DbId) -> StoreResult<i32> {
        Ok(PendingEmailRepo::increment_error(&self.pool, id).await?)
    }

    async fn mark_email_sent(&self, id: DbId) -> StoreResult<()> {
        Ok(PendingEmailRepo::mark_sent(&self.pool, id).await?)
    }

    async fn delete_pending_email(&self, id: DbId) -> StoreResult<()> {
        Ok(PendingEmailRepo::delete(&self.pool, id).await?)
    }

    async fn purge_sent_emails(&self, cutoff: Timestamp) -> StoreResult<u64> {
        Ok(PendingEmailRepo::delete_sent_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<DbId> {
        Ok(NotificationRepo::create(&self.pool, notification).await?)
    }

    async fn latest_notification_at(
        &self,
        user_id: DbId,
        message: &str,
        unread_only: bool,
    ) -> StoreResult<Option<Timestamp>> {
        Ok(NotificationRepo::latest_with_message(&self.pool, user_id, message, unread_only).await?)
    }

    async fn purge_read_notifications(&self, cutoff: Timestamp) -> StoreResult<u64> {
        Ok(NotificationRepo::delete_read_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn list_subscribers(&self, patterns: &[String], method: &str) -> StoreResult<Vec<DbId>> {
        Ok(SubscriptionRepo::list_subscribers(&self.pool, patterns, method).await?)
    }

    async fn add_subscription(
        &self,
        user_id: DbId,
        pattern: &str,
        method: &str,
    ) -> StoreResult<bool> {
        Ok(SubscriptionRepo::insert(&self.pool, user_id, pattern, method).await?)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn user_contact(&self, user_id: DbId) -> StoreResult<Option<UserContact>> {
        Ok(UserRepo::contact(&self.pool, user_id).await?)
    }

    async fn user_id_by_email(&self, email: &str) -> StoreResult<Option<DbId>> {
        Ok(UserRepo::id_by_email(&self.pool, email).await?)
    }

    async fn is_verified_address(&self, email: &str) -> StoreResult<bool> {
        Ok(UserRepo::is_verified_address(&self.pool, email).await?)
    }

    async fn admin_emails(&self) -> StoreResult<Vec<String>> {
        Ok(UserRepo::admin_emails(&self.pool).await?)
    }

    async fn preferences(&self, user_id: DbId) -> StoreResult<Preferences> {
        Ok(UserRepo::preferences(&self.pool, user_id)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit(&self, entry: &NewAuditEntry) -> StoreResult<DbId> {
        Ok(AuditLogRepo::insert(&self.pool, entry).await?)
    }
}

#[async_trait]
impl SearchStore for PgStore {
    async fn index_document(
        &self,
        kind: &str,
        id: DbId,
        counts: &BTreeMap<String, i32>,
    ) -> StoreResult<()> {
        Ok(SearchRepo::replace_document(&self.pool, kind, id, counts).await?)
    }
}

#[async_trait]
impl ContentStatsStore for PgStore {
    async fn recount_thread(&self, thread_id: DbId) -> StoreResult<bool> {
        Ok(ContentStatsRepo::recount_thread(&self.pool, thread_id)
            .await?
            .is_some())
    }

    async fn recount_topic(&self, topic_id: DbId) -> StoreResult<bool> {
        Ok(ContentStatsRepo::recount_topic(&self.pool, topic_id)
            .await?
            .is_some())
    }
}

#[async_trait]
impl DeadLetterStore for PgStore {
    async fn insert_dead_letter(&self, message: &str) -> StoreResult<DbId> {
        Ok(DeadLetterRepo::insert(&self.pool, message).await?)
    }

    async fn count_dead_letters(&self) -> StoreResult<i64> {
        Ok(DeadLetterRepo::count(&self.pool).await?)
    }
}
