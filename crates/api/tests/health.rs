mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{body_json, build_test_app, send};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_bus_state() {
    let test = build_test_app(Router::new());

    let response = send(&test.app, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
    assert_eq!(json["deferred_events"], 0);
    assert_eq!(json["bus"]["closed"], false);
}

#[tokio::test]
async fn closed_bus_is_degraded() {
    let test = build_test_app(Router::new());
    test.bus.shutdown();

    let json = body_json(send(&test.app, get("/health")).await).await;

    assert_eq!(json["status"], "degraded");
    assert_eq!(json["bus"]["closed"], true);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let test = build_test_app(Router::new());
    let response = send(&test.app, get("/this-route-does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
