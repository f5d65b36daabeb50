//! Task-event dispatch around page handlers.
//!
//! A handler that performs a task attaches a [`TaskReport`] to its response.
//! After the handler returns, [`task_events`] hands the report, the response
//! status, the request path and the acting user to the
//! [`TaskDispatcher`](agora_events::TaskDispatcher). Responses without a
//! report pass through untouched.

use agora_core::types::DbId;
use agora_events::TaskCompletion;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponseParts, Response, ResponseParts};
use serde_json::{Map, Value};

use crate::state::AppState;

/// The authenticated user, inserted as a request extension by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub DbId);

/// What a handler did, returned alongside its response.
///
/// ```ignore
/// async fn reply(...) -> impl IntoResponse {
///     let report = TaskReport::new("Reply").with("thread_id", thread_id);
///     (StatusCode::SEE_OTHER, report, Redirect::to(&thread_url))
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task: String,
    pub data: Map<String, Value>,
}

impl TaskReport {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl IntoResponseParts for TaskReport {
    type Error = std::convert::Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// Publish the task event for a reported task.
pub async fn task_events(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let actor = request.extensions().get::<CurrentUser>().map(|user| user.0);
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let Some(report) = response.extensions_mut().remove::<TaskReport>() else {
        return response;
    };
    let status = response.status().as_u16();
    let task = report.task.clone();
    let outcome = state
        .dispatcher
        .complete(TaskCompletion {
            task: report.task,
            status,
            actor_user_id: actor,
            path,
            data: report.data,
        })
        .await;
    tracing::debug!(task = %task, status, ?outcome, "Task completion dispatched");

    response
}
