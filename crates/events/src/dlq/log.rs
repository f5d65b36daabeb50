use async_trait::async_trait;

use super::{DeadLetterQueue, DlqError, DlqMessage};

/// Writes dead letters to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDlq;

#[async_trait]
impl DeadLetterQueue for LogDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        let event = match &message.event {
            Some(event) => serde_json::to_string(event)?,
            None => String::new(),
        };
        tracing::error!(
            dead_letter = %message.error,
            task = message.task_name.as_deref().unwrap_or(""),
            event = %event,
            "Dead letter"
        );
        Ok(())
    }
}
