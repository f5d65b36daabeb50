mod common;

use agora_api::middleware::{CurrentUser, TaskReport};
use agora_api::state::AppState;
use agora_api::tasks::{ADD_EMAIL, REPLY};
use agora_events::event::{BusMessage, MessageKind};
use axum::body::Body;
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use common::{build_test_app, send};

async fn reply(Path((topic, thread)): Path<(i64, i64)>) -> impl IntoResponse {
    let report = TaskReport::new(REPLY)
        .with("topic_id", topic)
        .with("thread_id", thread)
        .with("topic_title", "Borrow checker tips");
    (StatusCode::SEE_OTHER, report, "posted")
}

async fn rejected_reply() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, TaskReport::new(REPLY), "empty reply")
}

async fn unknown_task() -> impl IntoResponse {
    (TaskReport::new("NoSuchTask"), "ok")
}

async fn plain() -> &'static str {
    "nothing to report"
}

fn pages() -> Router<AppState> {
    Router::new()
        .route("/forum/topic/{topic}/thread/{thread}/reply", post(reply))
        .route("/forum/topic/{topic}/thread/{thread}/empty", post(rejected_reply))
        .route("/admin/unknown", post(unknown_task))
        .route("/admin/email", post(|| async { (TaskReport::new(ADD_EMAIL), "added") }))
        .route("/plain", post(plain))
}

fn post_as(uri: &str, user: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(user) = user {
        builder = builder.extension(CurrentUser(user));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn successful_task_publishes_enriched_event() {
    let test = build_test_app(pages());
    test.store.add_user(7, "alice", None);
    let mut tasks = test.bus.subscribe(MessageKind::Task, "test");

    let response = send(&test.app, post_as("/forum/topic/5/thread/42/reply", Some(7))).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let Some(BusMessage::Task(event)) = tasks.recv().await else {
        panic!("expected a task event");
    };
    assert_eq!(event.task_name(), REPLY);
    assert_eq!(event.path, "/forum/topic/5/thread/42/reply");
    assert_eq!(event.actor_user_id, Some(7));
    assert!(!event.admin);
    assert_eq!(event.data["thread_id"], 42);
    assert_eq!(event.data["author"], "alice");
}

#[tokio::test]
async fn failed_request_publishes_nothing() {
    let test = build_test_app(pages());
    let _tasks = test.bus.subscribe(MessageKind::Task, "test");

    let response = send(&test.app, post_as("/forum/topic/5/thread/42/empty", Some(7))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test.bus.stats().kind(MessageKind::Task).published, 0);
}

#[tokio::test]
async fn unknown_task_and_plain_routes_publish_nothing() {
    let test = build_test_app(pages());
    let _tasks = test.bus.subscribe(MessageKind::Task, "test");

    assert_eq!(send(&test.app, post_as("/admin/unknown", Some(1))).await.status(), StatusCode::OK);
    assert_eq!(send(&test.app, post_as("/plain", Some(1))).await.status(), StatusCode::OK);

    assert_eq!(test.bus.stats().kind(MessageKind::Task).published, 0);
}

#[tokio::test]
async fn admin_path_marks_event_admin() {
    let test = build_test_app(pages());
    let mut tasks = test.bus.subscribe(MessageKind::Task, "test");

    send(&test.app, post_as("/admin/email", Some(1))).await;

    let Some(BusMessage::Task(event)) = tasks.recv().await else {
        panic!("expected a task event");
    };
    assert!(event.admin);
    assert_eq!(event.actor_user_id, Some(1));
}

#[tokio::test]
async fn closed_bus_defers_until_reopened() {
    let test = build_test_app(pages());
    test.bus.shutdown();

    let response = send(&test.app, post_as("/forum/topic/5/thread/42/reply", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(test.dispatcher.pending(), 1);

    test.bus.reopen();
    let mut tasks = test.bus.subscribe(MessageKind::Task, "test");
    assert_eq!(test.dispatcher.flush().await, 1);

    assert!(matches!(tasks.recv().await, Some(BusMessage::Task(_))));
    assert!(test.dlq.messages().is_empty());
}
