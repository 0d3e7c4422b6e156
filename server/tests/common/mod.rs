#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use venu_server::config::{Config, StorageBackend};
use venu_server::repository::Repositories;
use venu_server::routes::create_routes;
use venu_server::state::AppState;

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        database_max_connections: 1,
        storage: StorageBackend::Memory,
        host: "127.0.0.1".to_string(),
        port: 0,
        token_secret: "integration-test-secret".to_string(),
        token_ttl_hours: 1,
        password_hash_iterations: 10,
        notes_max_bytes: 2048,
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        production: false,
    }
}

pub fn app() -> Router {
    let config = test_config();
    create_routes(AppState::new(Repositories::in_memory(), &config), &config)
}

pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, bytes) = send_raw(app, method, uri, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Signs up a fresh account and returns `(token, user_id)`.
pub async fn signup(app: &Router, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/signup",
        None,
        Some(json!({ "name": "Test User", "email": email, "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["data"]["token"].as_str().unwrap().to_string(),
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
    )
}

pub fn event_body(max_attendees: Option<i64>, requires_approval: bool) -> Value {
    json!({
        "title": "Rust Meetup",
        "description": "Talks about async Rust",
        "date": "2031-03-14",
        "time": "18:00",
        "location": "Berlin",
        "category": "Technology",
        "maxAttendees": max_attendees,
        "requiresApproval": requires_approval,
    })
}

/// Creates an event owned by `token` and returns its id.
pub async fn create_event(
    app: &Router,
    token: &str,
    max_attendees: Option<i64>,
    requires_approval: bool,
) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/events",
        Some(token),
        Some(event_body(max_attendees, requires_approval)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

pub async fn guest_rsvp(app: &Router, event_id: &str, email: &str, tickets: i64) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/events/{event_id}/rsvp"),
        None,
        Some(json!({ "name": "Guest", "email": email, "ticketCount": tickets })),
    )
    .await
}

pub async fn attendee_count(app: &Router, event_id: &str, token: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::GET,
        &format!("/api/v1/events/{event_id}"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["attendee_count"].as_i64().unwrap()
}
