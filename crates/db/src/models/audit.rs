//! Audit log rows.

use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `audit_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub user_id: DbId,
    pub action: String,
    pub path: String,
    pub details: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for appending to the audit log. `details` must already be redacted.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: DbId,
    pub action: String,
    pub path: String,
    pub details: serde_json::Value,
}
