//! Repository for the `pending_emails` outbox.

use agora_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::pending_email::{NewPendingEmail, PendingEmail};

/// Column list for `pending_emails` queries.
const COLUMNS: &str = "id, to_user_id, body, direct_email, error_count, sent_at, created_at";

/// Outbox operations used by the notifier and the email-queue worker.
pub struct PendingEmailRepo;

impl PendingEmailRepo {
    /// Enqueue an email, returning the generated ID.
    pub async fn insert(pool: &PgPool, email: &NewPendingEmail) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO pending_emails (to_user_id, body, direct_email) \
             VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(email.to_user_id)
        .bind(&email.body)
        .bind(email.direct_email)
        .fetch_one(pool)
        .await
    }

    /// Oldest unsent email, if any.
    pub async fn next_unsent(pool: &PgPool) -> Result<Option<PendingEmail>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_emails \
             WHERE sent_at IS NULL \
             ORDER BY id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, PendingEmail>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Increment the failure counter and return its new value.
    pub async fn increment_error(pool: &PgPool, id: DbId) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE pending_emails SET error_count = error_count + 1 \
             WHERE id = $1 \
             RETURNING error_count",
        )
        .bind(id)
        .fetch_one(pool)
        .await
    }

    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pending_emails SET sent_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pending_emails WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete sent emails older than `cutoff`, returning the number removed.
    pub async fn delete_sent_before(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM pending_emails WHERE sent_at IS NOT NULL AND sent_at < $1")
                .bind(cutoff)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
