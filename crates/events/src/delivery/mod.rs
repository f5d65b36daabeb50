//! Outbound email.
//!
//! An [`EmailProvider`] delivers an already formatted RFC 5322 message to one
//! recipient. The notifier composes messages with [`compose`] and stores them
//! in the outbox; the email queue hands the stored bytes to the provider.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::Message;

pub mod email;

pub use email::{select_provider, LogProvider, SmtpConfig, SmtpProvider};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message or envelope could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The provider refused the message.
    #[error("Email rejected: {0}")]
    Rejected(String),
}

impl From<lettre::error::Error> for EmailError {
    fn from(e: lettre::error::Error) -> Self {
        EmailError::Build(e.to_string())
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Deliver a raw message to `recipient`.
    async fn send(&self, recipient: &str, message: &[u8]) -> Result<(), EmailError>;
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Build a formatted message with a plain-text part and, when `html` is not
/// empty, an HTML alternative.
pub fn compose(
    from: &str,
    to: &str,
    subject: &str,
    text: &str,
    html: &str,
) -> Result<String, EmailError> {
    let builder = Message::builder()
        .from(from.parse::<Mailbox>()?)
        .to(to.parse::<Mailbox>()?)
        .subject(subject);

    let message = if html.trim().is_empty() {
        builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text.to_string()),
        )?
    } else {
        builder.multipart(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        ))?
    };

    String::from_utf8(message.formatted()).map_err(|e| EmailError::Build(e.to_string()))
}

/// The first address in the `To:` header of a formatted message.
pub fn recipient_from_headers(message: &str) -> Option<String> {
    let mut value: Option<String> = None;
    for line in message.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(current) = value.as_mut() {
            // Folded header continuation.
            if line.starts_with(' ') || line.starts_with('\t') {
                current.push_str(line);
                continue;
            }
            break;
        }
        if let Some((name, rest)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("to") {
                value = Some(rest.trim().to_string());
            }
        }
    }

    let value = value?;
    let first = value.split(',').next()?.trim();
    first
        .parse::<Mailbox>()
        .ok()
        .map(|mailbox| mailbox.email.to_string())
}
