use std::sync::Arc;

use agora_db::DbPool;
use agora_events::{EventBus, TaskDispatcher};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// `None` when the application runs on the in-memory store.
    pub pool: Option<DbPool>,
    pub bus: Arc<EventBus>,
    /// Publishes task events for completed requests.
    pub dispatcher: Arc<TaskDispatcher>,
}
