use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `dead_letters` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeadLetter {
    pub id: DbId,
    pub message: String,
    pub created_at: Timestamp,
}
