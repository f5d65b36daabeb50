//! From finished request to published event.
//!
//! The host calls [`TaskDispatcher::complete`] once a request that ran a task
//! has produced its response. Failed requests (status 400 and above) publish
//! nothing. Otherwise the event is built, enriched in-process and published
//! exactly once. Events that meet a closed bus wait in a small resume queue
//! and go out with the next successful publish.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use agora_core::payload;
use agora_core::types::DbId;
use agora_db::store::UserDirectory;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::bus::{BusError, EventBus};
use crate::dlq::{record_or_log, DeadLetterQueue, DlqMessage};
use crate::event::{BusMessage, TaskEvent};
use crate::task::TaskRegistry;

/// Capacity of the resume queue.
pub const RESUME_QUEUE_CAPACITY: usize = 100;

/// What the host knows about a finished request.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: String,
    pub status: u16,
    pub actor_user_id: Option<DbId>,
    pub path: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published to this many subscribers.
    Published { receivers: usize },
    /// The request failed; nothing was published.
    Rejected,
    /// The task name is not registered.
    UnknownTask,
    /// The bus is closed; the event is waiting in the resume queue.
    Deferred,
}

/// Adds data to an event before it is published.
#[async_trait]
pub trait EventEnricher: Send + Sync {
    async fn enrich(&self, event: &mut TaskEvent);
}

/// Fills in [`payload::AUTHOR`] with the actor's username.
pub struct AuthorEnricher {
    users: Arc<dyn UserDirectory>,
}

impl AuthorEnricher {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl EventEnricher for AuthorEnricher {
    async fn enrich(&self, event: &mut TaskEvent) {
        let Some(actor) = event.actor_user_id else {
            return;
        };
        if event.data.contains_key(payload::AUTHOR) {
            return;
        }
        match self.users.user_contact(actor).await {
            Ok(Some(contact)) => {
                event
                    .data
                    .insert(payload::AUTHOR.to_string(), Value::String(contact.username));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, user_id = actor, "Failed to resolve author"),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskDispatcher
// ---------------------------------------------------------------------------

pub struct TaskDispatcher {
    registry: Arc<TaskRegistry>,
    bus: Arc<EventBus>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    enrichers: Vec<Arc<dyn EventEnricher>>,
    resume: Mutex<VecDeque<Arc<TaskEvent>>>,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        bus: Arc<EventBus>,
        dead_letters: Arc<dyn DeadLetterQueue>,
    ) -> Self {
        Self {
            registry,
            bus,
            dead_letters,
            enrichers: Vec::new(),
            resume: Mutex::new(VecDeque::new()),
        }
    }

    /// Run `enricher` on every event, after the ones already added.
    pub fn with_enricher(mut self, enricher: Arc<dyn EventEnricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    /// Publish the event for a finished request.
    pub async fn complete(&self, completion: TaskCompletion) -> DispatchOutcome {
        if completion.status >= 400 {
            tracing::debug!(task = %completion.task, status = completion.status, "Task failed, not publishing");
            return DispatchOutcome::Rejected;
        }
        let Some(task) = self.registry.get(&completion.task) else {
            tracing::warn!(task = %completion.task, "Unknown task, not publishing");
            return DispatchOutcome::UnknownTask;
        };

        let mut event = TaskEvent::new(task, completion.path);
        event.actor_user_id = completion.actor_user_id;
        event.admin = is_admin_path(&event.path);
        event.data = completion.data;
        for enricher in &self.enrichers {
            enricher.enrich(&mut event).await;
        }
        let event = Arc::new(event);

        let (outcome, flushed, evicted) = self.publish_in_order(event);
        if flushed > 0 {
            tracing::info!(flushed, "Resumed deferred task events");
        }
        match outcome {
            DispatchOutcome::Published { receivers } => {
                tracing::debug!(task = %completion.task, receivers, "Task event published");
            }
            _ => tracing::warn!(pending = self.pending(), "Event bus closed, task event deferred"),
        }
        if let Some(evicted) = evicted {
            let message = DlqMessage::for_event("resume queue full, task event dropped", &evicted);
            record_or_log(self.dead_letters.as_ref(), &message).await;
        }
        outcome
    }

    /// Publish queued events in order. Returns how many went out.
    pub async fn flush(&self) -> usize {
        let flushed = self.flush_locked(&mut self.lock_resume());
        if flushed > 0 {
            tracing::info!(flushed, "Resumed deferred task events");
        }
        flushed
    }

    /// Flush, then publish `event` or queue it, all under the resume lock so
    /// concurrent completions cannot overtake events that are still queued.
    ///
    /// Returns the outcome, how many queued events went out, and the event
    /// evicted from a full queue, if any.
    fn publish_in_order(
        &self,
        event: Arc<TaskEvent>,
    ) -> (DispatchOutcome, usize, Option<Arc<TaskEvent>>) {
        let mut queue = self.lock_resume();
        let flushed = self.flush_locked(&mut queue);
        if queue.is_empty() {
            if let Ok(receivers) = self.bus.publish(BusMessage::Task(Arc::clone(&event))) {
                return (DispatchOutcome::Published { receivers }, flushed, None);
            }
        }
        let evicted = if queue.len() >= RESUME_QUEUE_CAPACITY {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(event);
        (DispatchOutcome::Deferred, flushed, evicted)
    }

    fn flush_locked(&self, queue: &mut VecDeque<Arc<TaskEvent>>) -> usize {
        let mut flushed = 0;
        while let Some(event) = queue.front() {
            match self.bus.publish(BusMessage::Task(Arc::clone(event))) {
                Ok(_) => {
                    queue.pop_front();
                    flushed += 1;
                }
                Err(BusError::Closed) => break,
            }
        }
        flushed
    }

    /// Number of events waiting for the bus.
    pub fn pending(&self) -> usize {
        self.lock_resume().len()
    }

    /// Record every waiting event to the dead-letter queue. Used at shutdown.
    pub async fn drain_to_dead_letters(&self) -> usize {
        let drained: Vec<Arc<TaskEvent>> = self.lock_resume().drain(..).collect();
        for event in &drained {
            let message = DlqMessage::for_event("task event not published before shutdown", event);
            record_or_log(self.dead_letters.as_ref(), &message).await;
        }
        drained.len()
    }

    fn lock_resume(&self) -> std::sync::MutexGuard<'_, VecDeque<Arc<TaskEvent>>> {
        self.resume.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether the path lies under an `admin` segment.
pub fn is_admin_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "admin")
}
