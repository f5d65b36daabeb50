#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use agora_db::MemoryStore;
use agora_events::bus::EventBus;
use agora_events::delivery::{EmailError, EmailProvider};
use agora_events::dlq::memory::MemoryDlq;
use agora_events::notifier::{Notifier, NotifierConfig};
use agora_events::task::{AutoSubscribe, ChannelTemplates, TaskCapabilities, TaskRegistry};
use agora_events::templates::StaticTemplates;
use async_trait::async_trait;

pub const TOPIC: i64 = 5;
pub const THREAD: i64 = 42;
pub const REPLY_PATH: &str = "/forum/topic/5/thread/42/reply";
pub const THREAD_PATTERN: &str = "reply:/forum/topic/5/thread/42/*";

/// Email provider that records deliveries and can be told to fail.
#[derive(Default)]
pub struct RecordingProvider {
    sent: Mutex<Vec<(String, String)>>,
    failures: Mutex<VecDeque<String>>,
    always_fail: Mutex<bool>,
}

impl RecordingProvider {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for i in 0..times {
            failures.push_back(format!("smtp unavailable ({i})"));
        }
    }

    pub fn fail_always(&self) {
        *self.always_fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl EmailProvider for RecordingProvider {
    async fn send(&self, recipient: &str, message: &[u8]) -> Result<(), EmailError> {
        if *self.always_fail.lock().unwrap() {
            return Err(EmailError::Rejected("smtp unavailable".into()));
        }
        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            return Err(EmailError::Rejected(reason));
        }
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            String::from_utf8_lossy(message).into_owned(),
        ));
        Ok(())
    }
}

pub fn templates() -> StaticTemplates {
    StaticTemplates::new()
        .with_email(
            "reply",
            "New reply in {{ data.topic_title }}",
            "{{ data.author }} replied in {{ data.topic_title }}: {{ link }}",
            "<p>{{ data.author }} replied in {{ data.topic_title }}</p>",
        )
        .with_notification("reply", "{{ data.author }} replied to {{ data.topic_title }}")
        .with_email(
            "user_created",
            "New user {{ data.username }}",
            "{{ data.username }} signed up",
            "",
        )
        .with_notification("user_created", "New user {{ data.username }}")
        .with_email("email_added", "Email added", "Your address was added", "")
        .with_notification("email_added", "Your address was added")
}

pub fn registry() -> Arc<TaskRegistry> {
    let registry = Arc::new(TaskRegistry::new());
    registry.register(
        "Reply",
        TaskCapabilities::default()
            .with_subscribers(ChannelTemplates::named("reply"))
            .with_auto_subscribe(AutoSubscribe::Thread),
    );
    registry.register(
        "UserCreated",
        TaskCapabilities::default().with_admins(ChannelTemplates::named("user_created")),
    );
    registry.register(
        "EmailAdded",
        TaskCapabilities::default().with_actor(ChannelTemplates::named("email_added")),
    );
    registry
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub dlq: Arc<MemoryDlq>,
    pub registry: Arc<TaskRegistry>,
    pub notifier: Notifier,
}

pub fn harness(config: NotifierConfig) -> Harness {
    harness_with(config, templates())
}

pub fn harness_with(config: NotifierConfig, templates: StaticTemplates) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(64));
    let dlq = Arc::new(MemoryDlq::default());
    let notifier = Notifier::new(
        store.clone(),
        Arc::new(templates),
        bus.clone(),
        dlq.clone(),
        config,
    );
    Harness {
        store,
        bus,
        dlq,
        registry: registry(),
        notifier,
    }
}
