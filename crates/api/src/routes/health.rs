use agora_events::BusStatsSnapshot;
use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database is unreachable or the bus is closed.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub db_healthy: bool,
    /// Events waiting for the bus to reopen.
    pub deferred_events: usize,
    pub bus: BusStatsSnapshot,
}

/// GET /health -- service, database and event bus health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match &state.pool {
        Some(pool) => agora_db::health_check(pool).await.is_ok(),
        None => true,
    };
    let bus = state.bus.stats();

    let status = if db_healthy && !bus.closed { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        deferred_events: state.dispatcher.pending(),
        bus,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
