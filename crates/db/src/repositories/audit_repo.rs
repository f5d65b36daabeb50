//! Repository for the `audit_log` table.

use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::audit::NewAuditEntry;

pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append an entry, returning the generated ID.
    pub async fn insert(pool: &PgPool, entry: &NewAuditEntry) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO audit_log (user_id, action, path, details) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.path)
        .bind(&entry.details)
        .fetch_one(pool)
        .await
    }
}
