//! Read-only views of the forum's user tables.

use agora_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

/// Who a user is and where to reach them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserContact {
    pub id: DbId,
    pub username: String,
    /// Highest-priority verified address; `None` when nothing is verified.
    pub email: Option<String>,
}

/// Per-user notification preferences.
#[derive(Debug, Clone, Copy, FromRow, Serialize, PartialEq, Eq)]
pub struct Preferences {
    /// Subscribe the user to threads they reply to.
    pub auto_subscribe_replies: bool,
    /// Also subscribe by email when auto-subscribing.
    pub email_updates: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_subscribe_replies: true,
            email_updates: false,
        }
    }
}
