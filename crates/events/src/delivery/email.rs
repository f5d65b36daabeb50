//! Email providers: SMTP via `lettre`, and an opt-in log-only provider.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{EmailError, EmailProvider};

// ---------------------------------------------------------------------------
// SmtpConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl SmtpConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that no SMTP
    /// provider should be constructed.
    ///
    /// | Variable         | Required | Default |
    /// |------------------|----------|---------|
    /// | `SMTP_HOST`      | yes      | -       |
    /// | `SMTP_PORT`      | no       | `587`   |
    /// | `SMTP_USER`      | no       | -       |
    /// | `SMTP_PASSWORD`  | no       | -       |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpProvider
// ---------------------------------------------------------------------------

/// Relays stored messages through an SMTP server.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Address,
}

impl SmtpProvider {
    /// Build the transport once; connections are pooled by `lettre`.
    pub fn new(config: &SmtpConfig, from_address: &str) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_address.parse()?,
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, recipient: &str, message: &[u8]) -> Result<(), EmailError> {
        let envelope = Envelope::new(Some(self.from.clone()), vec![recipient.parse()?])?;
        self.transport.send_raw(&envelope, message).await?;
        tracing::info!(to = recipient, "Email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogProvider
// ---------------------------------------------------------------------------

/// Logs messages instead of sending them. Selected with `EMAIL_PROVIDER=log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProvider;

#[async_trait]
impl EmailProvider for LogProvider {
    async fn send(&self, recipient: &str, message: &[u8]) -> Result<(), EmailError> {
        tracing::info!(
            to = recipient,
            bytes = message.len(),
            body = %String::from_utf8_lossy(message),
            "Email delivery disabled, logging message"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Build the provider named by `EMAIL_PROVIDER`.
///
/// - `smtp` (default): an [`SmtpProvider`] when `smtp` is configured, else none.
/// - `log`: a [`LogProvider`]; messages are marked sent without delivery.
/// - `none` or empty: no provider.
///
/// With no provider the email queue leaves every message queued.
pub fn select_provider(
    name: &str,
    smtp: Option<&SmtpConfig>,
    from_address: &str,
) -> Result<Option<Arc<dyn EmailProvider>>, EmailError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "smtp" => match smtp {
            Some(config) => {
                tracing::info!(host = %config.smtp_host, port = config.smtp_port, "SMTP delivery enabled");
                Ok(Some(Arc::new(SmtpProvider::new(config, from_address)?)))
            }
            None => {
                tracing::warn!("SMTP_HOST not set, outgoing email stays queued");
                Ok(None)
            }
        },
        "log" => {
            tracing::warn!("EMAIL_PROVIDER=log, outgoing email is logged and not delivered");
            Ok(Some(Arc::new(LogProvider)))
        }
        "" | "none" => Ok(None),
        other => {
            tracing::warn!(provider = other, "Unknown email provider, outgoing email stays queued");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn email_error_display_address() {
        let addr_err: Result<Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }

    #[tokio::test]
    async fn log_provider_accepts_everything() {
        LogProvider.send("x@example.com", b"Subject: hi\r\n\r\nbody").await.unwrap();
    }

    #[tokio::test]
    async fn smtp_provider_rejects_bad_recipient_before_connecting() {
        let config = SmtpConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            smtp_user: None,
            smtp_password: None,
        };
        let provider = SmtpProvider::new(&config, "noreply@agora.local").unwrap();
        let result = provider.send("nope", b"").await;
        assert!(matches!(result, Err(EmailError::Address(_))));
    }

    #[tokio::test]
    async fn smtp_selection_without_host_builds_no_provider() {
        let provider = select_provider("smtp", None, "noreply@agora.local").unwrap();
        assert!(provider.is_none());
    }

    #[tokio::test]
    async fn log_provider_is_opt_in() {
        assert!(select_provider("log", None, "noreply@agora.local").unwrap().is_some());
        assert!(select_provider("none", None, "noreply@agora.local").unwrap().is_none());
        assert!(select_provider("carrier-pigeon", None, "noreply@agora.local").unwrap().is_none());
    }

    #[tokio::test]
    async fn smtp_selection_with_host_builds_provider() {
        let config = SmtpConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            smtp_user: None,
            smtp_password: None,
        };
        let provider = select_provider(" SMTP ", Some(&config), "noreply@agora.local").unwrap();
        assert!(provider.is_some());
    }
}
