//! Subsystem configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::email_queue::EmailQueueConfig;
use crate::notifier::NotifierConfig;
use crate::purge::MAX_RETENTION_DAYS;

/// Settings for the bus, the notifier, the email queue, the purger and the
/// dead-letter queue.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub bus_capacity: usize,
    pub email_enabled: bool,
    /// `smtp`, `log` or `none`.
    pub email_provider: String,
    pub email_poll_interval: Duration,
    pub email_min_send_delay: Duration,
    pub email_from: String,
    pub email_subject_prefix: String,
    pub notifications_enabled: bool,
    pub admin_notify: bool,
    pub admin_emails: Vec<String>,
    pub notification_dedup_window: Duration,
    pub missing_email_notice_window: Duration,
    pub purge_interval: Duration,
    pub retention_days: i64,
    /// Comma-separated dead-letter provider names.
    pub dlq_provider: String,
    pub dlq_file: PathBuf,
    pub dlq_dir: PathBuf,
    pub bus_stats_interval: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl EventsConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default               |
    /// |------------------------------------|-----------------------|
    /// | `EVENT_BUS_CAPACITY`               | `256`                 |
    /// | `EMAIL_ENABLED`                    | `true`                |
    /// | `EMAIL_PROVIDER`                   | `smtp`                |
    /// | `EMAIL_POLL_INTERVAL_SECS`         | `60`                  |
    /// | `EMAIL_MIN_SEND_DELAY_MS`          | `1000`                |
    /// | `EMAIL_FROM`                       | `noreply@agora.local` |
    /// | `EMAIL_SUBJECT_PREFIX`             | `agora`               |
    /// | `NOTIFICATIONS_ENABLED`            | `true`                |
    /// | `ADMIN_NOTIFY`                     | `true`                |
    /// | `ADMIN_EMAILS`                     | empty, comma list     |
    /// | `NOTIFICATION_DEDUP_WINDOW_SECS`   | `300`                 |
    /// | `MISSING_EMAIL_NOTICE_WINDOW_SECS` | `604800`              |
    /// | `NOTIFICATION_PURGE_INTERVAL_SECS` | `3600`                |
    /// | `NOTIFICATION_RETENTION_DAYS`      | `30`                  |
    /// | `DLQ_PROVIDER`                     | `log`                 |
    /// | `DLQ_FILE`                         | `dlq.log`             |
    /// | `DLQ_DIR`                          | `dlq`                 |
    /// | `BUS_STATS_INTERVAL_SECS`          | `300`                 |
    ///
    /// Unparseable values fall back to the default with a warning. So do
    /// intervals of zero and retention outside `1..=36500` days.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Self {
            bus_capacity: parse(&var, "EVENT_BUS_CAPACITY", 256),
            email_enabled: flag(&var, "EMAIL_ENABLED", true),
            email_provider: string("EMAIL_PROVIDER", "smtp"),
            email_poll_interval: Duration::from_secs(bounded(&var, "EMAIL_POLL_INTERVAL_SECS", 60, 1, u64::MAX)),
            email_min_send_delay: Duration::from_millis(parse(&var, "EMAIL_MIN_SEND_DELAY_MS", 1000)),
            email_from: string("EMAIL_FROM", "noreply@agora.local"),
            email_subject_prefix: string("EMAIL_SUBJECT_PREFIX", "agora"),
            notifications_enabled: flag(&var, "NOTIFICATIONS_ENABLED", true),
            admin_notify: flag(&var, "ADMIN_NOTIFY", true),
            admin_emails: var("ADMIN_EMAILS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            notification_dedup_window: Duration::from_secs(parse(
                &var,
                "NOTIFICATION_DEDUP_WINDOW_SECS",
                300,
            )),
            missing_email_notice_window: Duration::from_secs(parse(
                &var,
                "MISSING_EMAIL_NOTICE_WINDOW_SECS",
                604_800,
            )),
            purge_interval: Duration::from_secs(bounded(
                &var,
                "NOTIFICATION_PURGE_INTERVAL_SECS",
                3600,
                1,
                u64::MAX,
            )),
            retention_days: bounded(&var, "NOTIFICATION_RETENTION_DAYS", 30, 1, MAX_RETENTION_DAYS),
            dlq_provider: string("DLQ_PROVIDER", "log"),
            dlq_file: PathBuf::from(string("DLQ_FILE", "dlq.log")),
            dlq_dir: PathBuf::from(string("DLQ_DIR", "dlq")),
            bus_stats_interval: Duration::from_secs(bounded(&var, "BUS_STATS_INTERVAL_SECS", 300, 1, u64::MAX)),
        }
    }

    pub fn notifier(&self) -> NotifierConfig {
        NotifierConfig {
            enabled: self.notifications_enabled,
            admin_notify: self.admin_notify,
            admin_emails: self.admin_emails.clone(),
            from_address: self.email_from.clone(),
            subject_prefix: self.email_subject_prefix.clone(),
            dedup_window: to_chrono(self.notification_dedup_window),
            missing_email_window: to_chrono(self.missing_email_notice_window),
        }
    }

    pub fn email_queue(&self) -> EmailQueueConfig {
        EmailQueueConfig {
            enabled: self.email_enabled,
            poll_interval: self.email_poll_interval,
            min_send_delay: self.email_min_send_delay,
            admin_emails: self.admin_emails.clone(),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

fn parse<T: FromStr + Copy + std::fmt::Display>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid setting, using default");
            default
        }),
    }
}

/// Like [`parse`], but values outside `min..=max` also fall back.
fn bounded<T: FromStr + Copy + PartialOrd + std::fmt::Display>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    min: T,
    max: T,
) -> T {
    let value = parse(var, key, default);
    if value < min || value > max {
        tracing::warn!(key, value = %value, default = %default, "Setting out of range, using default");
        return default;
    }
    value
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!(key, value = %v, default, "Invalid flag, using default");
            default
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> EventsConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EventsConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let c = EventsConfig::default();
        assert_eq!(c.bus_capacity, 256);
        assert_eq!(c.email_poll_interval, Duration::from_secs(60));
        assert_eq!(c.email_min_send_delay, Duration::from_millis(1000));
        assert_eq!(c.dlq_provider, "log");
        assert_eq!(c.email_provider, "smtp");
        assert!(c.admin_emails.is_empty());
        assert_eq!(c.notifier().dedup_window, chrono::Duration::seconds(300));
        assert_eq!(c.notifier().missing_email_window, chrono::Duration::days(7));
        assert_eq!(c.retention(), chrono::Duration::days(30));
    }

    #[test]
    fn variables_override_defaults() {
        let c = config(&[
            ("EMAIL_ENABLED", "false"),
            ("ADMIN_EMAILS", " root@example.com, ,ops@example.com "),
            ("DLQ_PROVIDER", "db,log"),
            ("EMAIL_MIN_SEND_DELAY_MS", "250"),
        ]);
        assert!(!c.email_enabled);
        assert_eq!(c.admin_emails, vec!["root@example.com", "ops@example.com"]);
        assert_eq!(c.dlq_provider, "db,log");
        assert_eq!(c.email_queue().min_send_delay, Duration::from_millis(250));
        assert_eq!(c.email_queue().admin_emails.len(), 2);
    }

    #[test]
    fn invalid_values_fall_back() {
        let c = config(&[("EVENT_BUS_CAPACITY", "lots"), ("ADMIN_NOTIFY", "maybe")]);
        assert_eq!(c.bus_capacity, 256);
        assert!(c.admin_notify);
    }

    #[test]
    fn zero_intervals_and_unbounded_retention_fall_back() {
        let c = config(&[
            ("NOTIFICATION_PURGE_INTERVAL_SECS", "0"),
            ("BUS_STATS_INTERVAL_SECS", "0"),
            ("EMAIL_POLL_INTERVAL_SECS", "0"),
            ("NOTIFICATION_RETENTION_DAYS", "9223372036854775807"),
        ]);
        assert_eq!(c.purge_interval, Duration::from_secs(3600));
        assert_eq!(c.bus_stats_interval, Duration::from_secs(300));
        assert_eq!(c.email_poll_interval, Duration::from_secs(60));
        assert_eq!(c.retention(), chrono::Duration::days(30));

        let c = config(&[("NOTIFICATION_RETENTION_DAYS", "-5")]);
        assert_eq!(c.retention_days, 30);
        let c = config(&[("NOTIFICATION_RETENTION_DAYS", "90")]);
        assert_eq!(c.retention(), chrono::Duration::days(90));
    }
}
