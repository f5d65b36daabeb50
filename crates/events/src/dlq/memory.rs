//! Dead letters kept in memory, for tests and diagnostics.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{DeadLetterQueue, DlqError, DlqMessage};

#[derive(Debug, Default)]
pub struct MemoryDlq {
    messages: Mutex<Vec<DlqMessage>>,
    fail: Mutex<bool>,
}

impl MemoryDlq {
    /// Every recorded message, oldest first.
    pub fn messages(&self) -> Vec<DlqMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make subsequent records fail with [`DlqError::Unavailable`].
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

#[async_trait]
impl DeadLetterQueue for MemoryDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DlqError::Unavailable("memory sink failing".into()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}
