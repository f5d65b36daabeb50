//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod audit_repo;
pub mod content_stats_repo;
pub mod dead_letter_repo;
pub mod notification_repo;
pub mod pending_email_repo;
pub mod search_repo;
pub mod subscription_repo;
pub mod user_repo;

pub use audit_repo::AuditLogRepo;
pub use content_stats_repo::ContentStatsRepo;
pub use dead_letter_repo::DeadLetterRepo;
pub use notification_repo::NotificationRepo;
pub use pending_email_repo::PendingEmailRepo;
pub use search_repo::SearchRepo;
pub use subscription_repo::SubscriptionRepo;
pub use user_repo::UserRepo;
