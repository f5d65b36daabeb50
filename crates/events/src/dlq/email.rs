use std::sync::Arc;

use async_trait::async_trait;

use super::{DeadLetterQueue, DlqError, DlqMessage};
use crate::delivery::{compose, EmailProvider};

/// Mails each dead letter to the administrators.
pub struct EmailDlq {
    mailer: Option<Arc<dyn EmailProvider>>,
    recipients: Vec<String>,
    from_address: String,
}

impl EmailDlq {
    pub fn new(
        mailer: Option<Arc<dyn EmailProvider>>,
        recipients: Vec<String>,
        from_address: String,
    ) -> Self {
        Self {
            mailer,
            recipients,
            from_address,
        }
    }
}

#[async_trait]
impl DeadLetterQueue for EmailDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| DlqError::Unavailable("no email provider configured".into()))?;
        if self.recipients.is_empty() {
            return Err(DlqError::Unavailable("no administrator addresses configured".into()));
        }

        let subject = match &message.task_name {
            Some(task) => format!("Dead letter: {task}"),
            None => "Dead letter".to_string(),
        };
        let text = message.to_text();
        for recipient in &self.recipients {
            let raw = compose(&self.from_address, recipient, &subject, &text, "")?;
            mailer.send(recipient, raw.as_bytes()).await?;
        }
        Ok(())
    }
}
