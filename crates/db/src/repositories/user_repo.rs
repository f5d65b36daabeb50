//! Read-only queries against the forum's user tables.

use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{Preferences, UserContact};

pub struct UserRepo;

impl UserRepo {
    /// Username plus the highest-priority verified address.
    pub async fn contact(pool: &PgPool, user_id: DbId) -> Result<Option<UserContact>, sqlx::Error> {
        sqlx::query_as::<_, UserContact>(
            "SELECT u.id, u.username, \
                (SELECT e.email FROM user_emails e \
                 WHERE e.user_id = u.id AND e.verified_at IS NOT NULL \
                 ORDER BY e.notification_priority DESC, e.id ASC \
                 LIMIT 1) AS email \
             FROM users u WHERE u.id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Owner of an address, verified or not.
    pub async fn id_by_email(pool: &PgPool, email: &str) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT user_id FROM user_emails WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn is_verified_address(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_emails \
             WHERE LOWER(email) = LOWER($1) AND verified_at IS NOT NULL)",
        )
        .bind(email)
        .fetch_one(pool)
        .await
    }

    /// Verified addresses of every administrator.
    pub async fn admin_emails(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT e.email FROM user_emails e \
             JOIN users u ON u.id = e.user_id \
             WHERE u.is_admin = true AND e.verified_at IS NOT NULL \
             ORDER BY e.email",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn preferences(pool: &PgPool, user_id: DbId) -> Result<Option<Preferences>, sqlx::Error> {
        sqlx::query_as::<_, Preferences>(
            "SELECT auto_subscribe_replies, email_updates FROM preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}
