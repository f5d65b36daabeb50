//! Dead-letter queue.
//!
//! A [`DeadLetterQueue`] is where work that cannot be completed ends up: an
//! email that failed five times, a notification that could not be written,
//! a bus message a slow subscriber never saw. Providers are looked up by
//! name in a [`DlqRegistry`] so the host can configure them with a single
//! string such as `"db,log"`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use agora_db::store::{DeliveryStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::delivery::{EmailError, EmailProvider};
use crate::event::{EventSnapshot, TaskEvent};

pub mod db;
pub mod dir;
pub mod email;
pub mod file;
pub mod log;
pub mod memory;
pub mod multi;

pub use db::DbDlq;
pub use dir::DirDlq;
pub use email::EmailDlq;
pub use file::FileDlq;
pub use log::LogDlq;
pub use multi::MultiDlq;

// ---------------------------------------------------------------------------
// Message and error
// ---------------------------------------------------------------------------

/// One dead-letter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqMessage {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

impl DlqMessage {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            event: None,
            task_name: None,
        }
    }

    /// A record carrying the event that could not be handled.
    pub fn for_event(error: impl Into<String>, event: &TaskEvent) -> Self {
        Self {
            error: error.into(),
            event: Some(event.snapshot()),
            task_name: Some(event.task_name().to_string()),
        }
    }

    /// Human-readable form used by the text-based providers.
    pub fn to_text(&self) -> String {
        let mut text = format!("error: {}\n", self.error);
        if let Some(task) = &self.task_name {
            text.push_str(&format!("task: {task}\n"));
        }
        if let Some(event) = &self.event {
            let json = serde_json::to_string(event).unwrap_or_else(|e| format!("<{e}>"));
            text.push_str(&format!("event: {json}\n"));
        }
        text
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Dead-letter provider unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown dead-letter provider: {0}")]
    UnknownProvider(String),

    #[error("Dead-letter I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dead-letter serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Dead-letter store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dead-letter email error: {0}")]
    Email(#[from] EmailError),
}

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError>;
}

/// Record `message`, logging instead of returning a failure.
///
/// For callers whose own error path already ends here.
pub async fn record_or_log(dlq: &dyn DeadLetterQueue, message: &DlqMessage) {
    if let Err(e) = dlq.record(message).await {
        tracing::error!(error = %e, dead_letter = %message.error, "Failed to record dead letter");
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dependencies the built-in providers may need.
#[derive(Clone)]
pub struct DlqContext {
    pub store: Option<Arc<dyn DeliveryStore>>,
    pub file_path: PathBuf,
    pub dir_path: PathBuf,
    pub mailer: Option<Arc<dyn EmailProvider>>,
    pub admin_emails: Vec<String>,
    pub from_address: String,
}

impl Default for DlqContext {
    fn default() -> Self {
        Self {
            store: None,
            file_path: PathBuf::from("dlq.log"),
            dir_path: PathBuf::from("dlq"),
            mailer: None,
            admin_emails: Vec::new(),
            from_address: "noreply@agora.local".to_string(),
        }
    }
}

pub type DlqFactory =
    Arc<dyn Fn(&DlqContext) -> Result<Arc<dyn DeadLetterQueue>, DlqError> + Send + Sync>;

/// Provider name to factory map.
pub struct DlqRegistry {
    factories: Mutex<HashMap<String, DlqFactory>>,
}

impl DlqRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
        }
    }

    /// A registry holding `log`, `file`, `dir`, `db` and `email`.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register("log", |_| Ok(Arc::new(LogDlq)));
        registry.register("file", |ctx| Ok(Arc::new(FileDlq::new(&ctx.file_path))));
        registry.register("dir", |ctx| Ok(Arc::new(DirDlq::new(&ctx.dir_path))));
        registry.register("db", |ctx| {
            Ok(Arc::new(DbDlq::new(ctx.store.clone(), ctx.admin_emails.clone())))
        });
        registry.register("email", |ctx| {
            Ok(Arc::new(EmailDlq::new(
                ctx.mailer.clone(),
                ctx.admin_emails.clone(),
                ctx.from_address.clone(),
            )))
        });
        registry
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&DlqContext) -> Result<Arc<dyn DeadLetterQueue>, DlqError> + Send + Sync + 'static,
    {
        self.factories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Build the provider described by a comma-separated list of names.
    ///
    /// Whitespace and repeated names are ignored. A single name yields that
    /// provider; several yield a [`MultiDlq`] in the order given. An empty
    /// list yields [`LogDlq`].
    pub fn resolve(&self, spec: &str, ctx: &DlqContext) -> Result<Arc<dyn DeadLetterQueue>, DlqError> {
        let mut names: Vec<&str> = Vec::new();
        for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let factories: Vec<DlqFactory> = {
            let map = self.factories.lock().unwrap_or_else(|e| e.into_inner());
            names
                .iter()
                .map(|name| {
                    map.get(*name)
                        .cloned()
                        .ok_or_else(|| DlqError::UnknownProvider(name.to_string()))
                })
                .collect::<Result<_, _>>()?
        };

        let mut providers = factories
            .iter()
            .map(|factory| factory(ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match providers.len() {
            0 => Arc::new(LogDlq),
            1 => providers.remove(0),
            _ => Arc::new(MultiDlq::new(providers)),
        })
    }

    /// [`resolve`](Self::resolve), falling back to [`LogDlq`] with a warning.
    pub fn resolve_or_log(&self, spec: &str, ctx: &DlqContext) -> Arc<dyn DeadLetterQueue> {
        match self.resolve(spec, ctx) {
            Ok(dlq) => dlq,
            Err(e) => {
                tracing::warn!(error = %e, providers = spec, "Falling back to log dead-letter provider");
                Arc::new(LogDlq)
            }
        }
    }
}

impl Default for DlqRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
