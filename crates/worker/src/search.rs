//! Search indexing of posted content.

use std::sync::Arc;

use agora_core::payload::{read_search_document, SEARCH};
use agora_core::search::word_counts;
use agora_db::store::SearchStore;
use agora_events::event::TaskEvent;
use async_trait::async_trait;

use crate::error::WorkerError;
use crate::task_worker::TaskWorker;

/// Re-indexes the document carried under the `search` payload key.
pub struct SearchWorker {
    store: Arc<dyn SearchStore>,
}

impl SearchWorker {
    pub fn new(store: Arc<dyn SearchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskWorker for SearchWorker {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn handle(&self, event: &TaskEvent) -> Result<(), WorkerError> {
        if !event.is_success() {
            return Ok(());
        }
        let Some(document) = read_search_document(&event.data) else {
            if event.data.contains_key(SEARCH) {
                return Err(WorkerError::Payload(format!(
                    "malformed {SEARCH} document from {}",
                    event.task_name()
                )));
            }
            return Ok(());
        };

        let counts = word_counts(&document.text);
        self.store
            .index_document(&document.kind, document.id, &counts)
            .await?;
        tracing::debug!(
            kind = %document.kind,
            id = document.id,
            words = counts.len(),
            "Document indexed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::MemoryStore;
    use agora_events::task::{TaskCapabilities, TaskRegistry};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn event(data: serde_json::Value) -> TaskEvent {
        let registry = TaskRegistry::new();
        let task = registry.register("Reply", TaskCapabilities::default());
        TaskEvent::new(task, "/forum/topic/1/thread/2/reply").with_data(SEARCH, data)
    }

    #[tokio::test]
    async fn indexes_case_folded_word_counts() {
        let store = Arc::new(MemoryStore::new());
        let worker = SearchWorker::new(store.clone());

        worker
            .handle(&event(json!({"kind": "comment", "id": 7, "text": "Rust, rust and RUST!"})))
            .await
            .unwrap();

        let words = store.indexed_words("comment", 7).unwrap();
        assert_eq!(words.get("rust"), Some(&3));
        assert_eq!(words.get("and"), Some(&1));
        assert_eq!(words.len(), 2);
    }

    #[tokio::test]
    async fn reindexing_replaces_previous_words() {
        let store = Arc::new(MemoryStore::new());
        let worker = SearchWorker::new(store.clone());

        worker
            .handle(&event(json!({"kind": "comment", "id": 7, "text": "old words"})))
            .await
            .unwrap();
        worker
            .handle(&event(json!({"kind": "comment", "id": 7, "text": "new"})))
            .await
            .unwrap();

        let words = store.indexed_words("comment", 7).unwrap();
        assert_eq!(words.keys().collect::<Vec<_>>(), vec!["new"]);
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let worker = SearchWorker::new(Arc::new(MemoryStore::new()));
        assert_matches!(
            worker.handle(&event(json!({"kind": "comment"}))).await,
            Err(WorkerError::Payload(_))
        );
    }
}
