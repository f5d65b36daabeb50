//! Agora task-event bus and notification delivery.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub, one bounded
//!   `tokio::sync::broadcast` channel per [`MessageKind`].
//! - [`TaskEvent`] -- the immutable record of a completed task.
//! - [`TaskRegistry`] -- task types and their capabilities, resolved once at
//!   registration.
//! - [`TaskDispatcher`] -- turns request completions into published events.
//! - [`Notifier`] -- internal notifications, outbound email and auto-subscribe.
//! - [`EmailQueue`] -- the retrying outbox worker.
//! - [`dlq`] -- dead-letter queue providers and their registry.
//! - [`RetentionPurger`] -- periodic sweep of read notifications and sent mail.

pub mod bus;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod dlq;
pub mod email_queue;
pub mod event;
pub mod notifier;
pub mod purge;
pub mod task;
pub mod templates;

pub use bus::{BusError, BusStatsSnapshot, EventBus, Subscription};
pub use config::EventsConfig;
pub use delivery::{EmailError, EmailProvider};
pub use dispatch::{AuthorEnricher, DispatchOutcome, EventEnricher, TaskCompletion, TaskDispatcher};
pub use dlq::{DeadLetterQueue, DlqContext, DlqError, DlqMessage, DlqRegistry};
pub use email_queue::{EmailQueue, EmailQueueConfig, ProcessOutcome};
pub use event::{BusMessage, EventSnapshot, MessageKind, Outcome, TaskEvent};
pub use notifier::{Notifier, NotifierConfig, NotifyError};
pub use purge::RetentionPurger;
pub use task::{AutoSubscribe, ChannelTemplates, TaskCapabilities, TaskDescriptor, TaskRegistry};
pub use templates::{StaticTemplates, TemplateError, TemplateNamespace, TemplateRenderer, TemplateTriple};
