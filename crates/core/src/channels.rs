//! Well-known delivery method names.
//!
//! These must match the values stored in `subscriptions.method` and are the
//! two ways a matched subscriber can be reached by the notifier.

/// Internal notification row shown in the site's notification list.
pub const METHOD_INTERNAL: &str = "internal";

/// Outbound email queued in the `pending_emails` outbox.
pub const METHOD_EMAIL: &str = "email";

/// Notice sent to a subscriber that should receive email but has no verified
/// address on file.
pub const MISSING_EMAIL_MESSAGE: &str = "missing email address";

/// Link attached to the administrator alert raised when the dead-letter queue grows.
pub const DLQ_ADMIN_LINK: &str = "/admin/dlq";
