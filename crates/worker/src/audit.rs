//! Audit trail for administrative actions.

use std::sync::Arc;

use agora_core::audit::redact;
use agora_db::models::audit::NewAuditEntry;
use agora_db::store::AuditStore;
use agora_events::event::TaskEvent;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::WorkerError;
use crate::task_worker::TaskWorker;

/// Appends one audit row per successful admin event, payload redacted.
pub struct AuditWorker {
    store: Arc<dyn AuditStore>,
}

impl AuditWorker {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskWorker for AuditWorker {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, event: &TaskEvent) -> Result<(), WorkerError> {
        if !event.admin || !event.is_success() {
            return Ok(());
        }
        let Some(user_id) = event.actor_user_id else {
            tracing::warn!(task = %event.task_name(), path = %event.path, "Admin event without actor, not audited");
            return Ok(());
        };

        let entry = NewAuditEntry {
            user_id,
            action: event.task_name().to_string(),
            path: event.path.clone(),
            details: redact(&Value::Object(event.data.clone())),
        };
        let id = self.store.insert_audit(&entry).await?;
        tracing::debug!(audit_id = id, user_id, action = %entry.action, "Admin action audited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::audit::REDACTED;
    use agora_db::MemoryStore;
    use agora_events::task::{TaskCapabilities, TaskRegistry};

    #[tokio::test]
    async fn records_admin_events_with_redacted_payload() {
        let store = Arc::new(MemoryStore::new());
        let registry = TaskRegistry::new();
        let task = registry.register("UserEdit", TaskCapabilities::default());
        let worker = AuditWorker::new(store.clone());

        let event = TaskEvent::new(task.clone(), "/admin/users/9/edit")
            .with_actor(1)
            .with_admin(true)
            .with_data("username", "bob")
            .with_data("password", "hunter2");
        worker.handle(&event).await.unwrap();
        worker
            .handle(&TaskEvent::new(task, "/usr/profile").with_actor(1))
            .await
            .unwrap();

        let rows = store.audit_entries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "UserEdit");
        assert_eq!(rows[0].path, "/admin/users/9/edit");
        assert_eq!(rows[0].details["username"], "bob");
        assert_eq!(rows[0].details["password"], REDACTED);
    }
}
