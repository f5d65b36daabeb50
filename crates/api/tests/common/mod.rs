#![allow(dead_code)]

use std::sync::Arc;

use agora_api::config::ServerConfig;
use agora_api::router::build_app;
use agora_api::state::AppState;
use agora_api::tasks::register_forum_tasks;
use agora_db::MemoryStore;
use agora_events::dlq::memory::MemoryDlq;
use agora_events::{AuthorEnricher, EventBus, TaskDispatcher, TaskRegistry};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub dlq: Arc<MemoryDlq>,
    pub dispatcher: Arc<TaskDispatcher>,
}

/// The full application on the in-memory store, with `pages` mounted.
pub fn build_test_app(pages: Router<AppState>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let dlq = Arc::new(MemoryDlq::default());
    let bus = Arc::new(EventBus::new(16));
    let registry = Arc::new(TaskRegistry::new());
    register_forum_tasks(&registry);
    let dispatcher = Arc::new(
        TaskDispatcher::new(registry, bus.clone(), dlq.clone())
            .with_enricher(Arc::new(AuthorEnricher::new(store.clone()))),
    );

    let state = AppState {
        config: Arc::new(ServerConfig::default()),
        pool: None,
        bus: bus.clone(),
        dispatcher: dispatcher.clone(),
    };

    TestApp {
        app: build_app(state, pages),
        store,
        bus,
        dlq,
        dispatcher,
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
