//! Dead letters stored in the `dead_letters` table.

use std::sync::Arc;

use agora_core::channels::DLQ_ADMIN_LINK;
use agora_db::models::notification::NewNotification;
use agora_db::store::DeliveryStore;
use async_trait::async_trait;

use super::{DeadLetterQueue, DlqError, DlqMessage};

/// Database-backed provider.
///
/// Each time the table reaches a power-of-ten row count (1, 10, 100, ...)
/// every administrator gets an internal notification pointing at the
/// dead-letter page.
pub struct DbDlq {
    store: Option<Arc<dyn DeliveryStore>>,
    admin_emails: Vec<String>,
}

impl DbDlq {
    pub fn new(store: Option<Arc<dyn DeliveryStore>>, admin_emails: Vec<String>) -> Self {
        Self {
            store,
            admin_emails,
        }
    }

    async fn alert_admins(&self, store: &dyn DeliveryStore, count: i64) {
        let mut recipients = self.admin_emails.clone();
        match store.admin_emails().await {
            Ok(emails) => recipients.extend(emails),
            Err(e) => tracing::warn!(error = %e, "Failed to list administrator addresses"),
        }
        recipients.sort_unstable_by_key(|e| e.to_lowercase());
        recipients.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

        let message = format!("dead letter queue has {count} entries");
        for email in recipients {
            let user_id = match store.user_id_by_email(&email).await {
                Ok(Some(id)) => id,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, email = %email, "Failed to resolve administrator");
                    continue;
                }
            };
            let notification = NewNotification {
                user_id,
                link: Some(DLQ_ADMIN_LINK.to_string()),
                message: message.clone(),
            };
            if let Err(e) = store.insert_notification(&notification).await {
                tracing::warn!(error = %e, user_id, "Failed to notify administrator of dead letters");
            }
        }
    }
}

/// Whether `n` is 1, 10, 100, ...
pub fn is_power_of_ten(mut n: i64) -> bool {
    if n < 1 {
        return false;
    }
    while n % 10 == 0 {
        n /= 10;
    }
    n == 1
}

#[async_trait]
impl DeadLetterQueue for DbDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| DlqError::Unavailable("no database configured".into()))?;

        store.insert_dead_letter(&message.to_text()).await?;

        match store.count_dead_letters().await {
            Ok(count) if is_power_of_ten(count) => self.alert_admins(store, count).await,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to count dead letters"),
        }
        Ok(())
    }
}
