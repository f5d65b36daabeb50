//! Thread and topic counter maintenance.

use std::sync::Arc;

use agora_core::payload::{read_id, THREAD_ID, TOPIC_ID};
use agora_db::store::ContentStatsStore;
use agora_events::event::TaskEvent;
use async_trait::async_trait;

use crate::error::WorkerError;
use crate::task_worker::TaskWorker;

/// Recomputes the cached counters of the thread and topic an event touched.
pub struct ContentRollupWorker {
    store: Arc<dyn ContentStatsStore>,
}

impl ContentRollupWorker {
    pub fn new(store: Arc<dyn ContentStatsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskWorker for ContentRollupWorker {
    fn name(&self) -> &'static str {
        "content-rollup"
    }

    async fn handle(&self, event: &TaskEvent) -> Result<(), WorkerError> {
        if !event.is_success() {
            return Ok(());
        }
        // Thread first: topic counters are sums over its threads.
        if let Some(thread_id) = read_id(&event.data, THREAD_ID) {
            if !self.store.recount_thread(thread_id).await? {
                tracing::debug!(thread_id, "Thread gone, nothing to recount");
            }
        }
        if let Some(topic_id) = read_id(&event.data, TOPIC_ID) {
            if !self.store.recount_topic(topic_id).await? {
                tracing::debug!(topic_id, "Topic gone, nothing to recount");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::MemoryStore;
    use agora_events::task::{TaskCapabilities, TaskRegistry};

    #[tokio::test]
    async fn recounts_thread_before_topic() {
        let store = Arc::new(MemoryStore::new());
        store.add_thread(42);
        store.add_topic(5);
        let registry = TaskRegistry::new();
        let task = registry.register("Reply", TaskCapabilities::default());
        let worker = ContentRollupWorker::new(store.clone());

        let event = TaskEvent::new(task.clone(), "/forum/topic/5/thread/42/reply")
            .with_data(TOPIC_ID, 5)
            .with_data(THREAD_ID, 42);
        worker.handle(&event).await.unwrap();
        worker
            .handle(&TaskEvent::new(task, "/forum/topic/6").with_data(TOPIC_ID, 6))
            .await
            .unwrap();

        assert_eq!(
            store.recounts(),
            vec![("thread".to_string(), 42), ("topic".to_string(), 5)]
        );
    }
}
