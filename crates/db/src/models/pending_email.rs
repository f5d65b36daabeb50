//! Outbox rows awaiting delivery.

use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pending_emails` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingEmail {
    pub id: DbId,
    /// Recipient user; `None` for direct-email messages addressed by header.
    pub to_user_id: Option<DbId>,
    /// Raw RFC 5322 message, headers included.
    pub body: String,
    pub direct_email: bool,
    pub error_count: i32,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for enqueuing an email.
#[derive(Debug, Clone)]
pub struct NewPendingEmail {
    pub to_user_id: Option<DbId>,
    pub body: String,
    pub direct_email: bool,
}
