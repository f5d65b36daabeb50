//! The retrying email outbox worker.
//!
//! [`EmailQueue::process_next`] sends the oldest pending email. A failed
//! attempt bumps the row's error count; the attempt that takes the count past
//! [`MAX_PRIOR_FAILURES`] moves the message to the dead-letter queue and
//! deletes the row. [`EmailQueue::run`] repeats that step, sending at most
//! one email per `min_send_delay` and sleeping `poll_interval` when idle,
//! unless an [`EmailQueued`](crate::event::MessageKind::EmailQueued) message
//! wakes it earlier.

use std::sync::Arc;
use std::time::Duration;

use agora_core::types::DbId;
use agora_db::models::pending_email::PendingEmail;
use agora_db::store::{DeliveryStore, StoreError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::Subscription;
use crate::delivery::{recipient_from_headers, EmailProvider};
use crate::dlq::{record_or_log, DeadLetterQueue, DlqMessage};

/// Failures tolerated before the next one dead-letters the email.
pub const MAX_PRIOR_FAILURES: i32 = 4;

#[derive(Debug, Clone)]
pub struct EmailQueueConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub min_send_delay: Duration,
    /// Addresses accepted from the `To:` header without an account lookup.
    pub admin_emails: Vec<String>,
}

impl Default for EmailQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            min_send_delay: Duration::from_millis(1000),
            admin_emails: Vec::new(),
        }
    }
}

/// Result of one [`EmailQueue::process_next`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing pending, sending disabled, or no provider configured.
    Idle,
    Sent { id: DbId },
    Failed { id: DbId, error_count: i32 },
    DeadLettered { id: DbId },
}

pub struct EmailQueue {
    store: Arc<dyn DeliveryStore>,
    provider: Option<Arc<dyn EmailProvider>>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    config: EmailQueueConfig,
}

impl EmailQueue {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        provider: Option<Arc<dyn EmailProvider>>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        config: EmailQueueConfig,
    ) -> Self {
        Self {
            store,
            provider,
            dead_letters,
            config,
        }
    }

    /// Run until cancelled.
    pub async fn run(self, mut wake: Option<Subscription>, cancel: CancellationToken) {
        if !self.config.enabled || self.provider.is_none() {
            tracing::info!(
                enabled = self.config.enabled,
                provider = self.provider.is_some(),
                "Email queue idle: sending disabled"
            );
        }
        tracing::info!(
            poll_secs = self.config.poll_interval.as_secs(),
            min_delay_ms = self.config.min_send_delay.as_millis() as u64,
            "Email queue started"
        );

        let mut last_attempt: Option<Instant> = None;
        loop {
            let worked = match self.process_next().await {
                Ok(ProcessOutcome::Idle) => false,
                Ok(outcome) => {
                    tracing::debug!(?outcome, "Email queue step");
                    last_attempt = Some(Instant::now());
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Email queue step failed");
                    false
                }
            };

            if worked {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.min_send_delay) => {}
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = next_wake(&mut wake) => {
                    // Respect the floor between two sends.
                    if let Some(at) = last_attempt {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep_until(at + self.config.min_send_delay) => {}
                        }
                    }
                }
            }
        }
        tracing::info!("Email queue stopped");
    }

    /// Attempt the oldest pending email.
    pub async fn process_next(&self) -> Result<ProcessOutcome, StoreError> {
        if !self.config.enabled {
            return Ok(ProcessOutcome::Idle);
        }
        let Some(provider) = &self.provider else {
            return Ok(ProcessOutcome::Idle);
        };
        let Some(email) = self.store.next_pending_email().await? else {
            return Ok(ProcessOutcome::Idle);
        };

        let recipient = match self.resolve_recipient(&email).await {
            Ok(recipient) => recipient,
            Err(reason) => {
                tracing::warn!(email_id = email.id, reason = %reason, "Cannot resolve email recipient");
                return self.record_failure(&email, "unresolved", &reason).await;
            }
        };

        match provider.send(&recipient, email.body.as_bytes()).await {
            Ok(()) => {
                self.store.mark_email_sent(email.id).await?;
                tracing::info!(email_id = email.id, to = %recipient, "Queued email sent");
                Ok(ProcessOutcome::Sent { id: email.id })
            }
            Err(e) => {
                tracing::warn!(email_id = email.id, to = %recipient, error = %e, "Queued email failed");
                self.record_failure(&email, &recipient, &e.to_string()).await
            }
        }
    }

    async fn record_failure(
        &self,
        email: &PendingEmail,
        recipient: &str,
        reason: &str,
    ) -> Result<ProcessOutcome, StoreError> {
        let error_count = self.store.record_email_failure(email.id).await?;
        if error_count <= MAX_PRIOR_FAILURES {
            return Ok(ProcessOutcome::Failed {
                id: email.id,
                error_count,
            });
        }

        let message = DlqMessage::new(format!(
            "email {} to {recipient} failed: {reason}\n{}",
            email.id, email.body
        ));
        record_or_log(self.dead_letters.as_ref(), &message).await;
        self.store.delete_pending_email(email.id).await?;
        tracing::warn!(email_id = email.id, error_count, "Email moved to dead-letter queue");
        Ok(ProcessOutcome::DeadLettered { id: email.id })
    }

    /// Where to deliver a pending email.
    ///
    /// The recipient user's verified address wins. Otherwise the `To:` header
    /// is used if it names an administrator, or, for direct emails, a
    /// verified address.
    async fn resolve_recipient(&self, email: &PendingEmail) -> Result<String, String> {
        let user_id = email.to_user_id.filter(|id| *id != 0);
        if let Some(user_id) = user_id {
            match self.store.user_contact(user_id).await {
                Ok(Some(contact)) => {
                    if let Some(address) = contact.email.filter(|a| !a.is_empty()) {
                        return Ok(address);
                    }
                }
                Ok(None) => {}
                Err(e) => return Err(format!("get user: {e}")),
            }
        }

        let address = recipient_from_headers(&email.body)
            .ok_or_else(|| "parse address: no usable To header".to_string())?;

        if self.is_admin_address(&address).await {
            return Ok(address);
        }

        if email.direct_email {
            return match self.store.is_verified_address(&address).await {
                Ok(true) => Ok(address),
                Ok(false) => Err(format!("no verification record for {address}")),
                Err(e) => Err(format!("check address: {e}")),
            };
        }

        match user_id {
            Some(user_id) => Err(format!("invalid email for user {user_id}")),
            None => Err("unknown recipient".to_string()),
        }
    }

    async fn is_admin_address(&self, address: &str) -> bool {
        if self
            .config
            .admin_emails
            .iter()
            .any(|a| a.eq_ignore_ascii_case(address))
        {
            return true;
        }
        match self.store.admin_emails().await {
            Ok(emails) => emails.iter().any(|a| a.eq_ignore_ascii_case(address)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list administrator addresses");
                false
            }
        }
    }
}

/// Resolves on the next wake-up message. Never resolves once the bus is gone.
async fn next_wake(wake: &mut Option<Subscription>) {
    let closed = match wake.as_mut() {
        Some(subscription) => subscription.recv().await.is_none(),
        None => true,
    };
    if closed {
        *wake = None;
        std::future::pending::<()>().await;
    }
}
