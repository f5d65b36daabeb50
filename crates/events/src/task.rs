//! Task types and their capabilities.
//!
//! Every task the forum can run is registered once at start-up with a
//! [`TaskCapabilities`] value describing which side effects it supports.
//! Consumers read the capabilities off the event's [`TaskDescriptor`] instead
//! of probing the task at runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agora_core::payload;

use crate::event::TaskEvent;
use crate::templates::TemplateTriple;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Templates used for one audience (subscribers, admins or the actor).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTemplates {
    /// Email body and subject; all three must resolve before rendering.
    pub email: Option<TemplateTriple>,
    /// Internal notification message template.
    pub notification: Option<String>,
}

impl ChannelTemplates {
    /// Email triple and notification template sharing one logical name.
    pub fn named(name: &str) -> Self {
        Self {
            email: Some(TemplateTriple::named(name)),
            notification: Some(name.to_string()),
        }
    }

    pub fn email_only(name: &str) -> Self {
        Self {
            email: Some(TemplateTriple::named(name)),
            notification: None,
        }
    }

    pub fn notification_only(name: &str) -> Self {
        Self {
            email: None,
            notification: Some(name.to_string()),
        }
    }
}

/// Where a task subscribes its actor after a successful run.
#[derive(Debug, Clone, Copy)]
pub enum AutoSubscribe {
    /// Everything below the event's own path.
    EventPath,
    /// The thread named by `topic_id` and `thread_id` in the payload.
    Thread,
    /// A path computed from the event; `None` skips the subscription.
    Custom(fn(&TaskEvent) -> Option<String>),
}

impl AutoSubscribe {
    /// The `(action, path)` pair to subscribe to, if derivable.
    pub fn derive(&self, event: &TaskEvent) -> Option<(String, String)> {
        let path = match self {
            AutoSubscribe::EventPath => Some(event.path.clone()),
            AutoSubscribe::Thread => {
                let topic = payload::read_id(&event.data, payload::TOPIC_ID)?;
                let thread = payload::read_id(&event.data, payload::THREAD_ID)?;
                Some(format!("/forum/topic/{topic}/thread/{thread}"))
            }
            AutoSubscribe::Custom(derive) => derive(event),
        }?;
        Some((event.task_name().to_string(), path))
    }
}

/// Side effects a task type supports.
#[derive(Debug, Clone)]
pub struct TaskCapabilities {
    pub subscribers: Option<ChannelTemplates>,
    pub admins: Option<ChannelTemplates>,
    /// Notice sent back to the actor.
    pub actor: Option<ChannelTemplates>,
    pub auto_subscribe: Option<AutoSubscribe>,
    /// Per-task email toggle; internal notifications are unaffected.
    pub email_enabled: bool,
}

impl Default for TaskCapabilities {
    fn default() -> Self {
        Self {
            subscribers: None,
            admins: None,
            actor: None,
            auto_subscribe: None,
            email_enabled: true,
        }
    }
}

impl TaskCapabilities {
    pub fn with_subscribers(mut self, templates: ChannelTemplates) -> Self {
        self.subscribers = Some(templates);
        self
    }

    pub fn with_admins(mut self, templates: ChannelTemplates) -> Self {
        self.admins = Some(templates);
        self
    }

    pub fn with_actor(mut self, templates: ChannelTemplates) -> Self {
        self.actor = Some(templates);
        self
    }

    pub fn with_auto_subscribe(mut self, rule: AutoSubscribe) -> Self {
        self.auto_subscribe = Some(rule);
        self
    }

    pub fn without_email(mut self) -> Self {
        self.email_enabled = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registered task type.
#[derive(Debug)]
pub struct TaskDescriptor {
    pub name: String,
    pub capabilities: TaskCapabilities,
}

/// Name-to-descriptor map shared by the dispatcher and the host.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<TaskDescriptor>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a task type and return its descriptor.
    pub fn register(
        &self,
        name: impl Into<String>,
        capabilities: TaskCapabilities,
    ) -> Arc<TaskDescriptor> {
        let name = name.into();
        let descriptor = Arc::new(TaskDescriptor {
            name: name.clone(),
            capabilities,
        });
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if tasks.insert(name.clone(), Arc::clone(&descriptor)).is_some() {
            tracing::warn!(task = %name, "Task type registered twice, replacing");
        }
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskDescriptor>> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_resolves_capabilities_once() {
        let registry = TaskRegistry::new();
        let caps = TaskCapabilities::default()
            .with_subscribers(ChannelTemplates::named("reply"))
            .with_auto_subscribe(AutoSubscribe::Thread);
        let descriptor = registry.register("Reply", caps);

        let found = registry.get("Reply").unwrap();
        assert!(Arc::ptr_eq(&descriptor, &found));
        assert_eq!(
            found.capabilities.subscribers,
            Some(ChannelTemplates::named("reply"))
        );
        assert!(found.capabilities.auto_subscribe.is_some());
        assert!(registry.get("reply").is_none());
    }

    #[test]
    fn thread_rule_builds_thread_path() {
        let registry = TaskRegistry::new();
        let task = registry.register(
            "Reply",
            TaskCapabilities::default().with_auto_subscribe(AutoSubscribe::Thread),
        );
        let event = TaskEvent::new(task, "/forum/topic/5/thread/42/reply")
            .with_data("topic_id", 5)
            .with_data("thread_id", 42);

        assert_eq!(
            AutoSubscribe::Thread.derive(&event),
            Some(("Reply".to_string(), "/forum/topic/5/thread/42".to_string()))
        );
    }

    #[test]
    fn thread_rule_needs_both_ids() {
        let registry = TaskRegistry::new();
        let task = registry.register("Reply", TaskCapabilities::default());
        let event = TaskEvent::new(task, "/forum/topic/5/thread/42/reply").with_data("thread_id", 42);
        assert_eq!(AutoSubscribe::Thread.derive(&event), None);
    }

    #[test]
    fn custom_rule_uses_function() {
        fn news(event: &TaskEvent) -> Option<String> {
            event.path.strip_suffix("/comment").map(str::to_string)
        }
        let registry = TaskRegistry::new();
        let task = registry.register("NewsComment", TaskCapabilities::default());
        let event = TaskEvent::new(task, "/news/12/comment");
        assert_eq!(
            AutoSubscribe::Custom(news).derive(&event),
            Some(("NewsComment".to_string(), "/news/12".to_string()))
        );
    }

    #[test]
    fn email_enabled_by_default() {
        assert!(TaskCapabilities::default().email_enabled);
        assert!(!TaskCapabilities::default().without_email().email_enabled);
    }
}
