//! Repository for the `subscriptions` table.

use agora_core::types::DbId;
use sqlx::PgPool;

pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Subscribe a user; a duplicate `(user, pattern, method)` is a no-op.
    ///
    /// Returns `true` when a new row was created.
    pub async fn insert(
        pool: &PgPool,
        user_id: DbId,
        pattern: &str,
        method: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (user_id, pattern, method) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, pattern, method) DO NOTHING",
        )
        .bind(user_id)
        .bind(pattern)
        .bind(method)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Distinct users holding any of `patterns` with the given delivery method.
    pub async fn list_subscribers(
        pool: &PgPool,
        patterns: &[String],
        method: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM subscriptions \
             WHERE pattern = ANY($1) AND method = $2 \
             ORDER BY user_id",
        )
        .bind(patterns)
        .bind(method)
        .fetch_all(pool)
        .await
    }
}
