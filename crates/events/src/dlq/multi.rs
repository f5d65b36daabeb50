use std::sync::Arc;

use async_trait::async_trait;

use super::{DeadLetterQueue, DlqError, DlqMessage};

/// Fans a record out to several providers.
///
/// Every child is tried even when an earlier one fails; the first error is
/// returned.
pub struct MultiDlq {
    children: Vec<Arc<dyn DeadLetterQueue>>,
}

impl MultiDlq {
    pub fn new(children: Vec<Arc<dyn DeadLetterQueue>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl DeadLetterQueue for MultiDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        let mut first_error = None;
        for child in &self.children {
            if let Err(e) = child.record(message).await {
                tracing::warn!(error = %e, "Dead-letter provider failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::memory::MemoryDlq;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn later_children_run_after_a_failure() {
        let failing = Arc::new(MemoryDlq::default());
        failing.set_failing(true);
        let healthy = Arc::new(MemoryDlq::default());
        let multi = MultiDlq::new(vec![failing.clone() as Arc<dyn DeadLetterQueue>, healthy.clone()]);

        let result = multi.record(&DlqMessage::new("boom")).await;

        assert_matches!(result, Err(DlqError::Unavailable(_)));
        assert_eq!(healthy.messages().len(), 1);
        assert!(failing.messages().is_empty());
    }
}
