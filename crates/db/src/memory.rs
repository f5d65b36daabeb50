//! In-process implementation of every store trait.
//!
//! Used by the test suites and by local runs without a database. State sits
//! behind one mutex; inspection helpers return clones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use agora_core::types::{DbId, Timestamp};
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::models::audit::{AuditLog, NewAuditEntry};
use crate::models::dead_letter::DeadLetter;
use crate::models::notification::{NewNotification, Notification};
use crate::models::pending_email::{NewPendingEmail, PendingEmail};
use crate::models::subscription::Subscription;
use crate::models::user::{Preferences, UserContact};
use crate::store::{
    AuditStore, ContentStatsStore, DeadLetterStore, EmailOutbox, NotificationStore,
    SearchStore, StoreError, StoreResult, SubscriptionStore, UserDirectory,
};

#[derive(Debug, Clone)]
struct UserRow {
    id: DbId,
    username: String,
    is_admin: bool,
}

#[derive(Debug, Clone)]
struct EmailRow {
    user_id: DbId,
    email: String,
    verified: bool,
}

#[derive(Default)]
struct Inner {
    next_id: DbId,
    users: Vec<UserRow>,
    emails: Vec<EmailRow>,
    preferences: BTreeMap<DbId, Preferences>,
    pending: Vec<PendingEmail>,
    notifications: Vec<Notification>,
    subscriptions: Vec<Subscription>,
    dead_letters: Vec<DeadLetter>,
    audit: Vec<AuditLog>,
    search: BTreeMap<(String, DbId), BTreeMap<String, i32>>,
    threads: BTreeSet<DbId>,
    topics: BTreeSet<DbId>,
    recounts: Vec<(String, DbId)>,
    fail_dead_letters: bool,
    fail_outbox: bool,
    fail_user_lookups: bool,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test must not cascade into unrelated assertions.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Add a user, optionally with a verified address.
    pub fn add_user(&self, id: DbId, username: &str, verified_email: Option<&str>) {
        let mut inner = self.lock();
        inner.users.push(UserRow {
            id,
            username: username.to_string(),
            is_admin: false,
        });
        if let Some(email) = verified_email {
            inner.emails.push(EmailRow {
                user_id: id,
                email: email.to_string(),
                verified: true,
            });
        }
    }

    /// Attach an address that has not been verified.
    pub fn add_unverified_email(&self, user_id: DbId, email: &str) {
        self.lock().emails.push(EmailRow {
            user_id,
            email: email.to_string(),
            verified: false,
        });
    }

    pub fn set_admin(&self, user_id: DbId) {
        for user in self.lock().users.iter_mut().filter(|u| u.id == user_id) {
            user.is_admin = true;
        }
    }

    pub fn set_preferences(&self, user_id: DbId, preferences: Preferences) {
        self.lock().preferences.insert(user_id, preferences);
    }

    pub fn add_thread(&self, thread_id: DbId) {
        self.lock().threads.insert(thread_id);
    }

    pub fn add_topic(&self, topic_id: DbId) {
        self.lock().topics.insert(topic_id);
    }

    /// Make every dead-letter write fail with [`StoreError::Unavailable`].
    pub fn fail_dead_letter_writes(&self, fail: bool) {
        self.lock().fail_dead_letters = fail;
    }

    /// Make every outbox insert fail with [`StoreError::Unavailable`].
    pub fn fail_outbox_writes(&self, fail: bool) {
        self.lock().fail_outbox = fail;
    }

    /// Make every contact lookup fail with [`StoreError::Unavailable`].
    pub fn fail_user_lookups(&self, fail: bool) {
        self.lock().fail_user_lookups = fail;
    }

    pub fn mark_notification_read(&self, id: DbId) {
        for n in self.lock().notifications.iter_mut().filter(|n| n.id == id) {
            n.is_read = true;
            n.read_at = Some(Utc::now());
        }
    }

    /// Shift a notification's creation time into the past.
    pub fn backdate_notification(&self, id: DbId, by: Duration) {
        for n in self.lock().notifications.iter_mut().filter(|n| n.id == id) {
            n.created_at -= by;
        }
    }

    /// Shift a sent email's `sent_at` into the past.
    pub fn backdate_sent_email(&self, id: DbId, by: Duration) {
        for e in self.lock().pending.iter_mut().filter(|e| e.id == id) {
            if let Some(sent_at) = e.sent_at.as_mut() {
                *sent_at -= by;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// All outbox rows, sent or not, in insertion order.
    pub fn pending_emails(&self) -> Vec<PendingEmail> {
        self.lock().pending.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn notifications_for(&self, user_id: DbId) -> Vec<Notification> {
        self.lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditLog> {
        self.lock().audit.clone()
    }

    pub fn indexed_words(&self, kind: &str, id: DbId) -> Option<BTreeMap<String, i32>> {
        self.lock().search.get(&(kind.to_string(), id)).cloned()
    }

    /// `("thread" | "topic", id)` for every successful recount.
    pub fn recounts(&self) -> Vec<(String, DbId)> {
        self.lock().recounts.clone()
    }
}

#[async_trait]
impl EmailOutbox for MemoryStore {
    async fn enqueue_email(&self, email: &NewPendingEmail) -> StoreResult<DbId> {
        let mut inner = self.lock();
        if inner.fail_outbox {
            return Err(StoreError::Unavailable("outbox writes disabled".into()));
        }
        let id = inner.next_id();
        inner.pending.push(PendingEmail {
            id,
            to_user_id: email.to_user_id,
            body: email.body.clone(),
            direct_email: email.direct_email,
            error_count: 0,
            sent_at: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn next_pending_email(&self) -> StoreResult<Option<PendingEmail>> {
        Ok(self
            .lock()
            .pending
            .iter()
            .filter(|e| e.sent_at.is_none())
            .min_by_key(|e| e.id)
            .cloned())
    }

    async fn record_email_failure(&self, id: DbId) -> StoreResult<i32> {
        let mut inner = self.lock();
        let row = inner
            .pending
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::Unavailable(format!("pending email {id} not found")))?;
        row.error_count += 1;
        Ok(row.error_count)
    }

    async fn mark_email_sent(&self, id: DbId) -> StoreResult<()> {
        for e in self.lock().pending.iter_mut().filter(|e| e.id == id) {
            e.sent_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_pending_email(&self, id: DbId) -> StoreResult<()> {
        self.lock().pending.retain(|e| e.id != id);
        Ok(())
    }

    async fn purge_sent_emails(&self, cutoff: Timestamp) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner
            .pending
            .retain(|e| !e.sent_at.is_some_and(|sent| sent < cutoff));
        Ok((before - inner.pending.len()) as u64)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<DbId> {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.notifications.push(Notification {
            id,
            user_id: notification.user_id,
            link: notification.link.clone(),
            message: Some(notification.message.clone()),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn latest_notification_at(
        &self,
        user_id: DbId,
        message: &str,
        unread_only: bool,
    ) -> StoreResult<Option<Timestamp>> {
        Ok(self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && n.message.as_deref() == Some(message))
            .filter(|n| !unread_only || !n.is_read)
            .map(|n| n.created_at)
            .max())
    }

    async fn purge_read_notifications(&self, cutoff: Timestamp) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.notifications.len();
        inner
            .notifications
            .retain(|n| !(n.is_read && n.created_at < cutoff));
        Ok((before - inner.notifications.len()) as u64)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn list_subscribers(&self, patterns: &[String], method: &str) -> StoreResult<Vec<DbId>> {
        let users: BTreeSet<DbId> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.method == method && patterns.contains(&s.pattern))
            .map(|s| s.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn add_subscription(
        &self,
        user_id: DbId,
        pattern: &str,
        method: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let exists = inner
            .subscriptions
            .iter()
            .any(|s| s.user_id == user_id && s.pattern == pattern && s.method == method);
        if exists {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.subscriptions.push(Subscription {
            id,
            user_id,
            pattern: pattern.to_string(),
            method: method.to_string(),
            created_at: Utc::now(),
        });
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_contact(&self, user_id: DbId) -> StoreResult<Option<UserContact>> {
        let inner = self.lock();
        if inner.fail_user_lookups {
            return Err(StoreError::Unavailable("user lookups disabled".into()));
        }
        Ok(inner.users.iter().find(|u| u.id == user_id).map(|u| {
            let email = inner
                .emails
                .iter()
                .find(|e| e.user_id == user_id && e.verified)
                .map(|e| e.email.clone());
            UserContact {
                id: u.id,
                username: u.username.clone(),
                email,
            }
        }))
    }

    async fn user_id_by_email(&self, email: &str) -> StoreResult<Option<DbId>> {
        Ok(self
            .lock()
            .emails
            .iter()
            .find(|e| e.email.eq_ignore_ascii_case(email))
            .map(|e| e.user_id))
    }

    async fn is_verified_address(&self, email: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .emails
            .iter()
            .any(|e| e.verified && e.email.eq_ignore_ascii_case(email)))
    }

    async fn admin_emails(&self) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        let mut emails: Vec<String> = inner
            .emails
            .iter()
            .filter(|e| e.verified)
            .filter(|e| inner.users.iter().any(|u| u.id == e.user_id && u.is_admin))
            .map(|e| e.email.clone())
            .collect();
        emails.sort();
        Ok(emails)
    }

    async fn preferences(&self, user_id: DbId) -> StoreResult<Preferences> {
        Ok(self
            .lock()
            .preferences
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit(&self, entry: &NewAuditEntry) -> StoreResult<DbId> {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.audit.push(AuditLog {
            id,
            user_id: entry.user_id,
            action: entry.action.clone(),
            path: entry.path.clone(),
            details: entry.details.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn index_document(
        &self,
        kind: &str,
        id: DbId,
        counts: &BTreeMap<String, i32>,
    ) -> StoreResult<()> {
        self.lock()
            .search
            .insert((kind.to_string(), id), counts.clone());
        Ok(())
    }
}

#[async_trait]
impl ContentStatsStore for MemoryStore {
    async fn recount_thread(&self, thread_id: DbId) -> StoreResult<bool> {
        let mut inner = self.lock();
        if !inner.threads.contains(&thread_id) {
            return Ok(false);
        }
        inner.recounts.push(("thread".to_string(), thread_id));
        Ok(true)
    }

    async fn recount_topic(&self, topic_id: DbId) -> StoreResult<bool> {
        let mut inner = self.lock();
        if !inner.topics.contains(&topic_id) {
            return Ok(false);
        }
        inner.recounts.push(("topic".to_string(), topic_id));
        Ok(true)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryStore {
    async fn insert_dead_letter(&self, message: &str) -> StoreResult<DbId> {
        let mut inner = self.lock();
        if inner.fail_dead_letters {
            return Err(StoreError::Unavailable("dead letter writes disabled".into()));
        }
        let id = inner.next_id();
        inner.dead_letters.push(DeadLetter {
            id,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn count_dead_letters(&self) -> StoreResult<i64> {
        Ok(self.lock().dead_letters.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_subscription_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.add_subscription(1, "reply:/a/*", "internal").await.unwrap());
        assert!(!store.add_subscription(1, "reply:/a/*", "internal").await.unwrap());
        assert!(store.add_subscription(1, "reply:/a/*", "email").await.unwrap());
        assert_eq!(store.subscriptions().len(), 2);
    }

    #[tokio::test]
    async fn list_subscribers_filters_by_method_and_dedups() {
        let store = MemoryStore::new();
        store.add_subscription(2, "reply:/a/*", "internal").await.unwrap();
        store.add_subscription(2, "reply:/*", "internal").await.unwrap();
        store.add_subscription(3, "reply:/a/*", "email").await.unwrap();

        let patterns = vec!["reply:/a/*".to_string(), "reply:/*".to_string()];
        assert_eq!(store.list_subscribers(&patterns, "internal").await.unwrap(), vec![2]);
        assert_eq!(store.list_subscribers(&patterns, "email").await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn next_pending_email_skips_sent_rows() {
        let store = MemoryStore::new();
        let email = NewPendingEmail {
            to_user_id: Some(1),
            body: "body".into(),
            direct_email: false,
        };
        let first = store.enqueue_email(&email).await.unwrap();
        let second = store.enqueue_email(&email).await.unwrap();

        assert_eq!(store.next_pending_email().await.unwrap().map(|e| e.id), Some(first));
        store.mark_email_sent(first).await.unwrap();
        assert_eq!(store.next_pending_email().await.unwrap().map(|e| e.id), Some(second));
    }

    #[tokio::test]
    async fn record_email_failure_returns_new_count() {
        let store = MemoryStore::new();
        let id = store
            .enqueue_email(&NewPendingEmail {
                to_user_id: None,
                body: "b".into(),
                direct_email: true,
            })
            .await
            .unwrap();
        assert_eq!(store.record_email_failure(id).await.unwrap(), 1);
        assert_eq!(store.record_email_failure(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn contact_only_exposes_verified_address() {
        let store = MemoryStore::new();
        store.add_user(4, "dana", None);
        store.add_unverified_email(4, "dana@example.com");

        let contact = store.user_contact(4).await.unwrap().unwrap();
        assert_eq!(contact.email, None);
        assert_eq!(store.user_id_by_email("DANA@example.com").await.unwrap(), Some(4));
        assert!(!store.is_verified_address("dana@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn unread_filter_ignores_read_notifications() {
        let store = MemoryStore::new();
        let id = store
            .insert_notification(&NewNotification {
                user_id: 1,
                link: None,
                message: "hello".into(),
            })
            .await
            .unwrap();
        store.mark_notification_read(id);

        assert!(store.latest_notification_at(1, "hello", true).await.unwrap().is_none());
        assert!(store.latest_notification_at(1, "hello", false).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_removes_only_old_read_notifications() {
        let store = MemoryStore::new();
        let new = |message: &str| NewNotification {
            user_id: 1,
            link: None,
            message: message.into(),
        };
        let old_read = store.insert_notification(&new("a")).await.unwrap();
        let old_unread = store.insert_notification(&new("b")).await.unwrap();
        store.mark_notification_read(old_read);
        store.backdate_notification(old_read, Duration::days(40));
        store.backdate_notification(old_unread, Duration::days(40));

        let removed = store
            .purge_read_notifications(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.notifications().len(), 1);
    }
}
