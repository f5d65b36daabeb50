//! Repository for the `dead_letters` table.

use agora_core::types::DbId;
use sqlx::PgPool;

pub struct DeadLetterRepo;

impl DeadLetterRepo {
    pub async fn insert(pool: &PgPool, message: &str) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("INSERT INTO dead_letters (message) VALUES ($1) RETURNING id")
            .bind(message)
            .fetch_one(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(pool)
            .await
    }
}
