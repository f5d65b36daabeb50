//! The task event model.
//!
//! A [`TaskEvent`] is built by the dispatcher once a task has finished and is
//! never mutated after it is published. Consumers receive it as
//! `Arc<TaskEvent>` inside a [`BusMessage`].

use std::sync::Arc;

use agora_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::TaskDescriptor;

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A completed user-triggered task.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// Registered task type; carries the capability set.
    pub task: Arc<TaskDescriptor>,

    /// User that performed the task, `None` for anonymous requests.
    pub actor_user_id: Option<DbId>,

    /// Request path the task ran under, e.g. `"/forum/topic/5/thread/42/reply"`.
    pub path: String,

    pub outcome: Outcome,

    /// Whether the task ran under the administrative area.
    pub admin: bool,

    /// Free-form payload; see `agora_core::payload` for the well-known keys.
    pub data: Map<String, Value>,

    pub occurred_at: Timestamp,
}

impl TaskEvent {
    /// A successful, non-admin event with an empty payload.
    pub fn new(task: Arc<TaskDescriptor>, path: impl Into<String>) -> Self {
        Self {
            task,
            actor_user_id: None,
            path: path.into(),
            outcome: Outcome::Success,
            admin: false,
            data: Map::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Insert one payload entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task.name
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Serializable copy used by dead-letter records.
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            task: self.task.name.clone(),
            actor_user_id: self.actor_user_id,
            path: self.path.clone(),
            outcome: self.outcome,
            admin: self.admin,
            data: self.data.clone(),
            occurred_at: self.occurred_at,
        }
    }
}

/// A [`TaskEvent`] with the task reduced to its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub task: String,
    pub actor_user_id: Option<DbId>,
    pub path: String,
    pub outcome: Outcome,
    pub admin: bool,
    pub data: Map<String, Value>,
    pub occurred_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Bus messages
// ---------------------------------------------------------------------------

/// Routing key for bus subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A completed task.
    Task,
    /// A new row was written to the email outbox.
    EmailQueued,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Task, MessageKind::EmailQueued];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Task => "task",
            MessageKind::EmailQueued => "email_queued",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum BusMessage {
    Task(Arc<TaskEvent>),
    EmailQueued,
}

impl BusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::Task(_) => MessageKind::Task,
            BusMessage::EmailQueued => MessageKind::EmailQueued,
        }
    }
}

impl From<TaskEvent> for BusMessage {
    fn from(event: TaskEvent) -> Self {
        BusMessage::Task(Arc::new(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskCapabilities, TaskRegistry};

    #[test]
    fn snapshot_keeps_payload_and_task_name() {
        let registry = TaskRegistry::new();
        let task = registry.register("Reply", TaskCapabilities::default());
        let event = TaskEvent::new(task, "/forum/topic/1/thread/2/reply")
            .with_actor(9)
            .with_data("thread_id", 2);

        let snapshot = event.snapshot();
        assert_eq!(snapshot.task, "Reply");
        assert_eq!(snapshot.actor_user_id, Some(9));
        assert_eq!(snapshot.data["thread_id"], 2);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["outcome"], "success");
    }

    #[test]
    fn message_kind_follows_variant() {
        let registry = TaskRegistry::new();
        let task = registry.register("Edit", TaskCapabilities::default());
        assert_eq!(BusMessage::from(TaskEvent::new(task, "/x")).kind(), MessageKind::Task);
        assert_eq!(BusMessage::EmailQueued.kind(), MessageKind::EmailQueued);
    }
}
