use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: DbId,
    pub user_id: DbId,
    /// `"<action>:<path-prefix>/*"`, see `agora_core::subscription`.
    pub pattern: String,
    /// `"internal"` or `"email"`.
    pub method: String,
    pub created_at: Timestamp,
}
