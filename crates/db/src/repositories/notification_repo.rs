//! Repository for the `notifications` table.

use agora_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification::NewNotification;

/// Provides insert, lookup and retention operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Create a notification for a user, returning the generated ID.
    pub async fn create(pool: &PgPool, new: &NewNotification) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO notifications (user_id, link, message) \
             VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(new.user_id)
        .bind(&new.link)
        .bind(&new.message)
        .fetch_one(pool)
        .await
    }

    /// Creation time of the newest notification for `user_id` carrying exactly `message`.
    ///
    /// When `unread_only` is `true`, read notifications are ignored.
    pub async fn latest_with_message(
        pool: &PgPool,
        user_id: DbId,
        message: &str,
        unread_only: bool,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        let filter = if unread_only { "AND is_read = false" } else { "" };
        let query = format!(
            "SELECT created_at FROM notifications \
             WHERE user_id = $1 AND message = $2 {filter} \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_scalar(&query)
            .bind(user_id)
            .bind(message)
            .fetch_optional(pool)
            .await
    }

    /// Delete read notifications created before `cutoff`.
    pub async fn delete_read_before(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = true AND created_at < $1")
                .bind(cutoff)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
