//! Task-event to notification routing.
//!
//! [`Notifier`] consumes [`MessageKind::Task`] messages. For each successful
//! event it notifies up to three audiences, depending on the task's
//! capabilities:
//!
//! - **admins**: every configured administrator address, by email and, when
//!   the address belongs to an account, by internal notification;
//! - **actor**: the user who ran the task;
//! - **subscribers**: users holding a subscription pattern that covers the
//!   event, by the method they subscribed with.
//!
//! It then applies the task's auto-subscribe rule to the actor. Failures are
//! recorded to the dead-letter queue with the event attached; one failing
//! recipient never stops delivery to the others.

use std::collections::BTreeSet;
use std::sync::Arc;

use agora_core::channels::{METHOD_EMAIL, METHOD_INTERNAL, MISSING_EMAIL_MESSAGE};
use agora_core::subscription::{expand_patterns, pattern_for};
use agora_core::types::DbId;
use agora_db::models::notification::NewNotification;
use agora_db::models::pending_email::NewPendingEmail;
use agora_db::models::user::UserContact;
use agora_db::store::{DeliveryStore, StoreError};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, EventBus, Subscription};
use crate::delivery::{compose, EmailError};
use crate::dlq::{record_or_log, DeadLetterQueue, DlqMessage};
use crate::event::{BusMessage, TaskEvent};
use crate::task::ChannelTemplates;
use crate::templates::{TemplateError, TemplateNamespace, TemplateRenderer, TemplateTriple};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Email(#[from] EmailError),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// When off, only auto-subscribe runs.
    pub enabled: bool,
    pub admin_notify: bool,
    pub admin_emails: Vec<String>,
    pub from_address: String,
    /// Prepended to every subject as `[prefix] `.
    pub subject_prefix: String,
    /// Identical unread notifications inside this window are not repeated.
    pub dedup_window: Duration,
    /// Minimum gap between two "missing email address" notices.
    pub missing_email_window: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_notify: true,
            admin_emails: Vec::new(),
            from_address: "noreply@agora.local".to_string(),
            subject_prefix: "agora".to_string(),
            dedup_window: Duration::seconds(300),
            missing_email_window: Duration::days(7),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier {
    store: Arc<dyn DeliveryStore>,
    templates: Arc<dyn TemplateRenderer>,
    bus: Arc<EventBus>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    config: NotifierConfig,
}

/// Per-event bookkeeping.
#[derive(Default)]
struct Delivery {
    emails_queued: usize,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        templates: Arc<dyn TemplateRenderer>,
        bus: Arc<EventBus>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            templates,
            bus,
            dead_letters,
            config,
        }
    }

    /// Consume task events until cancelled or the bus closes.
    pub async fn run(self, mut subscription: Subscription, cancel: CancellationToken) {
        tracing::info!("Notifier started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(BusMessage::Task(event)) => self.handle(&event).await,
                    Some(_) => {}
                    None => break,
                },
            }
        }
        tracing::info!("Notifier stopped");
    }

    /// Deliver every notification one event calls for.
    pub async fn handle(&self, event: &TaskEvent) {
        if !event.is_success() {
            return;
        }
        let caps = &event.task.capabilities;
        let mut delivery = Delivery::default();

        if self.config.enabled {
            if let Some(templates) = &caps.admins {
                if self.config.admin_notify {
                    self.notify_admins(event, templates, &mut delivery).await;
                }
            }
            if let Some(templates) = &caps.actor {
                self.notify_actor(event, templates, &mut delivery).await;
            }
            if let Some(templates) = &caps.subscribers {
                self.notify_subscribers(event, templates, &mut delivery).await;
            }
        }

        if caps.auto_subscribe.is_some() {
            if let Err(e) = self.auto_subscribe(event).await {
                self.fail(event, "auto subscribe", &e).await;
            }
        }

        if delivery.emails_queued > 0 {
            match self.bus.publish(BusMessage::EmailQueued) {
                Ok(_) => {}
                Err(BusError::Closed) => {
                    tracing::debug!("Bus closed, email queue will pick up mail on its next poll");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Audiences
    // -----------------------------------------------------------------------

    async fn notify_admins(&self, event: &TaskEvent, templates: &ChannelTemplates, delivery: &mut Delivery) {
        let mut recipients = self.config.admin_emails.clone();
        match self.store.admin_emails().await {
            Ok(emails) => recipients.extend(emails),
            Err(e) => self.fail(event, "list administrators", &e.into()).await,
        }
        let mut seen = BTreeSet::new();
        recipients.retain(|email| seen.insert(email.to_lowercase()));

        for address in recipients {
            let user_id = match self.store.user_id_by_email(&address).await {
                Ok(id) => id,
                Err(e) => {
                    self.fail(event, &format!("resolve administrator {address}"), &e.into()).await;
                    None
                }
            };

            if let Some(triple) = self.email_templates(event, templates) {
                let ctx = self.context(event, user_id, &address);
                // Addressed by header so the queue accepts it as an admin address.
                match self.queue_email(None, &address, triple, &ctx).await {
                    Ok(()) => delivery.emails_queued += 1,
                    Err(e) => self.fail(event, &format!("deliver admin email to {address}"), &e).await,
                }
            }

            if let (Some(name), Some(uid)) = (&templates.notification, user_id) {
                let ctx = self.context(event, Some(uid), &address);
                if let Err(e) = self.notify_internal(uid, name, &ctx, Some(&event.path)).await {
                    self.fail(event, &format!("deliver admin note to {uid}"), &e).await;
                }
            }
        }
    }

    async fn notify_actor(&self, event: &TaskEvent, templates: &ChannelTemplates, delivery: &mut Delivery) {
        let Some(actor) = event.actor_user_id else {
            return;
        };
        let contact = match self.store.user_contact(actor).await {
            Ok(contact) => contact,
            Err(e) => {
                self.fail(event, &format!("load actor {actor}"), &e.into()).await;
                return;
            }
        };
        let address = contact.as_ref().and_then(|c| c.email.clone());

        if let Some(triple) = self.email_templates(event, templates) {
            match &address {
                Some(address) => {
                    let ctx = self.contact_context(event, actor, contact.as_ref(), address);
                    match self.queue_email(Some(actor), address, triple, &ctx).await {
                        Ok(()) => delivery.emails_queued += 1,
                        Err(e) => self.fail(event, &format!("deliver self email to {actor}"), &e).await,
                    }
                }
                None => {
                    if let Err(e) = self.notify_missing_email(actor).await {
                        self.fail(event, &format!("missing email notice to {actor}"), &e).await;
                    }
                }
            }
        }

        if let Some(name) = &templates.notification {
            let ctx = self.contact_context(event, actor, contact.as_ref(), address.as_deref().unwrap_or(""));
            if let Err(e) = self.notify_internal(actor, name, &ctx, Some(&event.path)).await {
                self.fail(event, &format!("deliver self note to {actor}"), &e).await;
            }
        }
    }

    async fn notify_subscribers(
        &self,
        event: &TaskEvent,
        templates: &ChannelTemplates,
        delivery: &mut Delivery,
    ) {
        let patterns = expand_patterns(event.task_name(), &event.path);
        let mut internal: BTreeSet<DbId> = BTreeSet::new();

        if let Some(triple) = self.email_templates(event, templates) {
            for user_id in self.subscribers(event, &patterns, METHOD_EMAIL).await {
                match self.email_subscriber(event, user_id, triple).await {
                    Ok(true) => delivery.emails_queued += 1,
                    // No verified address: the notice plus the internal copy.
                    Ok(false) => {
                        internal.insert(user_id);
                    }
                    Err(e) => self.fail(event, &format!("deliver email to {user_id}"), &e).await,
                }
            }
        }

        if let Some(name) = &templates.notification {
            internal.extend(self.subscribers(event, &patterns, METHOD_INTERNAL).await);
            for user_id in internal {
                let contact = match self.store.user_contact(user_id).await {
                    Ok(contact) => contact,
                    Err(e) => {
                        self.fail(event, &format!("load subscriber {user_id}"), &e.into()).await;
                        None
                    }
                };
                let ctx = self.contact_context(event, user_id, contact.as_ref(), "");
                if let Err(e) = self.notify_internal(user_id, name, &ctx, Some(&event.path)).await {
                    self.fail(event, &format!("deliver internal to {user_id}"), &e).await;
                }
            }
        }
    }

    /// Subscribers for `method`, minus the actor.
    async fn subscribers(&self, event: &TaskEvent, patterns: &[String], method: &str) -> Vec<DbId> {
        match self.store.list_subscribers(patterns, method).await {
            Ok(ids) => ids
                .into_iter()
                .filter(|id| Some(*id) != event.actor_user_id)
                .collect(),
            Err(e) => {
                self.fail(event, &format!("list {method} subscribers"), &e.into()).await;
                Vec::new()
            }
        }
    }

    /// Queue one subscriber email. `Ok(false)` when the user has no verified
    /// address; they got the missing-email notice and no pending email.
    async fn email_subscriber(
        &self,
        event: &TaskEvent,
        user_id: DbId,
        triple: &TemplateTriple,
    ) -> Result<bool, NotifyError> {
        let contact = self.store.user_contact(user_id).await?;
        let Some(address) = contact.as_ref().and_then(|c| c.email.clone()) else {
            self.notify_missing_email(user_id).await?;
            return Ok(false);
        };
        let ctx = self.contact_context(event, user_id, contact.as_ref(), &address);
        self.queue_email(Some(user_id), &address, triple, &ctx).await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Auto-subscribe
    // -----------------------------------------------------------------------

    async fn auto_subscribe(&self, event: &TaskEvent) -> Result<(), NotifyError> {
        let (Some(actor), Some(rule)) = (event.actor_user_id, event.task.capabilities.auto_subscribe)
        else {
            return Ok(());
        };
        let Some((action, path)) = rule.derive(event) else {
            tracing::debug!(task = %event.task_name(), "No auto-subscribe path for event");
            return Ok(());
        };

        let preferences = self.store.preferences(actor).await?;
        if !preferences.auto_subscribe_replies {
            return Ok(());
        }

        let pattern = pattern_for(&action, &path);
        let mut methods = vec![METHOD_INTERNAL];
        if preferences.email_updates {
            methods.push(METHOD_EMAIL);
        }
        for method in methods {
            if self.store.add_subscription(actor, &pattern, method).await? {
                tracing::info!(user_id = actor, pattern = %pattern, method, "Auto-subscribed");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delivery primitives
    // -----------------------------------------------------------------------

    /// The email triple for an audience, if email is allowed and every member
    /// resolves.
    fn email_templates<'a>(
        &self,
        event: &TaskEvent,
        templates: &'a ChannelTemplates,
    ) -> Option<&'a TemplateTriple> {
        if !event.task.capabilities.email_enabled {
            return None;
        }
        let triple = templates.email.as_ref()?;
        if !triple.resolves(self.templates.as_ref()) {
            tracing::warn!(
                task = %event.task_name(),
                template = %triple.html,
                "Email templates incomplete, skipping email"
            );
            return None;
        }
        Some(triple)
    }

    async fn queue_email(
        &self,
        user_id: Option<DbId>,
        address: &str,
        triple: &TemplateTriple,
        ctx: &Value,
    ) -> Result<(), NotifyError> {
        let rendered = triple.render(self.templates.as_ref(), ctx)?;
        let subject = if self.config.subject_prefix.is_empty() {
            rendered.subject
        } else {
            format!("[{}] {}", self.config.subject_prefix, rendered.subject)
        };
        let body = compose(&self.config.from_address, address, &subject, &rendered.text, &rendered.html)?;
        let id = self
            .store
            .enqueue_email(&NewPendingEmail {
                to_user_id: user_id,
                body,
                direct_email: false,
            })
            .await?;
        tracing::debug!(email_id = id, to = address, "Email queued");
        Ok(())
    }

    /// Render and insert an internal notification unless an identical unread
    /// one was created inside the de-duplication window.
    async fn notify_internal(
        &self,
        user_id: DbId,
        template: &str,
        ctx: &Value,
        link: Option<&str>,
    ) -> Result<(), NotifyError> {
        if !self.templates.exists(TemplateNamespace::Notification, template) {
            tracing::warn!(template, "Notification template missing, skipping");
            return Ok(());
        }
        let message = self
            .templates
            .render(TemplateNamespace::Notification, template, ctx)?
            .trim()
            .to_string();

        if self
            .seen_within(user_id, &message, self.config.dedup_window, true)
            .await?
        {
            tracing::debug!(user_id, "Duplicate notification suppressed");
            return Ok(());
        }
        self.store
            .insert_notification(&NewNotification {
                user_id,
                link: link.map(str::to_string),
                message,
            })
            .await?;
        Ok(())
    }

    async fn notify_missing_email(&self, user_id: DbId) -> Result<(), NotifyError> {
        if self
            .seen_within(user_id, MISSING_EMAIL_MESSAGE, self.config.missing_email_window, false)
            .await?
        {
            return Ok(());
        }
        self.store
            .insert_notification(&NewNotification {
                user_id,
                link: None,
                message: MISSING_EMAIL_MESSAGE.to_string(),
            })
            .await?;
        tracing::info!(user_id, "User notified of missing email address");
        Ok(())
    }

    async fn seen_within(
        &self,
        user_id: DbId,
        message: &str,
        window: Duration,
        unread_only: bool,
    ) -> Result<bool, NotifyError> {
        let latest = self
            .store
            .latest_notification_at(user_id, message, unread_only)
            .await?;
        Ok(latest.is_some_and(|at| Utc::now() - at < window))
    }

    fn context(&self, event: &TaskEvent, user_id: Option<DbId>, email: &str) -> Value {
        json!({
            "task": event.task_name(),
            "path": event.path,
            "link": event.path,
            "actor_user_id": event.actor_user_id,
            "admin": event.admin,
            "data": event.data,
            "recipient": {
                "id": user_id,
                "email": email,
            },
        })
    }

    fn contact_context(
        &self,
        event: &TaskEvent,
        user_id: DbId,
        contact: Option<&UserContact>,
        email: &str,
    ) -> Value {
        let mut ctx = self.context(event, Some(user_id), email);
        if let Some(contact) = contact {
            ctx["recipient"]["username"] = Value::String(contact.username.clone());
        }
        ctx
    }

    async fn fail(&self, event: &TaskEvent, what: &str, error: &NotifyError) {
        tracing::error!(error = %error, task = %event.task_name(), "Notification failed: {what}");
        let message = DlqMessage::for_event(format!("{what}: {error}"), event);
        record_or_log(self.dead_letters.as_ref(), &message).await;
    }
}
