//! HTTP handler tests against an in-memory journal.

mod helpers;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use rendezvous::api::{self, AppState};
use rendezvous::config::JournalConfig;

const ALICE_LOG: &str = "\
05/01 14:00 location W #777 friends+
05/01 14:00 join 💚 bob
05/01 14:45 leave 💚 bob
";

const BOB_LOG: &str = "\
05/01 14:00 location W #777 friends+
05/01 14:00 join 💚 alice
05/01 14:45 leave 💚 alice
";

fn app() -> Router {
    api::router(AppState::new(helpers::test_db(), JournalConfig::default()))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn send_json(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_text(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn import_convert_and_read_back() {
    let app = app();
    for name in ["alice", "bob"] {
        let (status, _) = send(&app, post_json("/api/users", json!({ "username": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        post_text("/api/users/alice/logs?reference=2024-05-31T00:00:00", ALICE_LOG),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["imported_count"], 3);

    send(
        &app,
        post_text("/api/users/bob/logs?reference=2024-05-31T00:00:00", BOB_LOG),
    )
    .await;

    let (status, body) = send(&app, post_json("/api/users/alice/convert", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["converted_count"], 1);
    assert_eq!(body["friend_edges_created"], 1);

    let (_, body) = send(&app, post_json("/api/users/bob/convert", json!({}))).await;
    assert_eq!(body["converted_count"], 1);
    assert_eq!(body["mirrored_count"], 1);

    let (status, body) = send(&app, get("/api/users/bob/friends")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["friends"][0]["username"], "alice");

    let (_, body) = send(&app, get("/api/users/alice/stats")).await;
    assert_eq!(body["stats"]["total_events"], 1);
    assert_eq!(body["stats"]["total_seconds"], 2700);

    let (status, body) = send(&app, get("/api/events/1/group")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, post_json("/api/groups/recompute", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group_count"], 1);
}

#[tokio::test]
async fn unknown_user_is_a_404_with_error_body() {
    let app = app();
    let (status, body) = send(&app, post_text("/api/users/ghost/logs", ALICE_LOG)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("ghost"));

    // The server keeps answering.
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    send(&app, post_json("/api/users", json!({ "username": "alice" }))).await;
    let (status, body) = send(&app, post_json("/api/users", json!({ "username": "alice" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn bad_reference_is_rejected() {
    let app = app();
    send(&app, post_json("/api/users", json!({ "username": "alice" }))).await;
    let (status, body) = send(&app, post_text("/api/users/alice/logs?reference=soon", ALICE_LOG)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn missing_event_group_is_404() {
    let (status, body) = send(&app(), get("/api/events/99/group")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn manual_events_can_be_annotated_and_deleted() {
    let app = app();
    for name in ["alice", "bob"] {
        send(&app, post_json("/api/users", json!({ "username": name }))).await;
    }

    let world = json!({ "name": "The Black Cat", "external_id": "#12345" });
    let (status, body) = send(
        &app,
        post_json(
            "/api/users/alice/events",
            json!({
                "world": world,
                "companion_name": "bob",
                "start": "2024-05-01T20:00:00",
                "end": "2024-05-01T21:00:00",
                "notes": "karaoke",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let alices = body["event"]["id"].as_i64().unwrap();
    assert_eq!(body["event"]["notes"], "karaoke");

    // bob's view, five minutes off, lands in alice's group through the window.
    let (_, body) = send(
        &app,
        post_json(
            "/api/users/bob/events",
            json!({
                "world": world,
                "companion_name": "alice",
                "start": "2024-05-01T20:05:00",
                "end": "2024-05-01T21:05:00",
            }),
        ),
    )
    .await;
    let bobs = body["event"]["id"].as_i64().unwrap();
    let (_, body) = send(&app, get(&format!("/api/events/{bobs}/group"))).await;
    assert_eq!(body["members"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        send_json(
            Method::PUT,
            &format!("/api/events/{alices}/notes"),
            json!({ "notes": "karaoke, then pizza" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"], "karaoke, then pizza");

    for tag in ["music", "late"] {
        send(&app, post_json(&format!("/api/events/{alices}/tags"), json!({ "tag": tag }))).await;
    }
    let (_, body) = send(&app, delete(&format!("/api/events/{alices}/tags/late"))).await;
    assert_eq!(body["removed"], true);
    assert_eq!(body["tags"], json!(["music"]));
    let (_, body) = send(&app, get("/api/tags")).await;
    assert_eq!(body["tags"][0]["name"], "music");

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/events/{alices}/comments"),
            json!({ "username": "alice", "content": "great night" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let first = body["comment"]["id"].as_i64().unwrap();
    send(
        &app,
        post_json(
            &format!("/api/events/{bobs}/comments"),
            json!({ "username": "bob", "content": "same!", "parent_id": first }),
        ),
    )
    .await;
    let (_, body) = send(&app, get(&format!("/api/events/{alices}/comments"))).await;
    assert_eq!(body["comments"].as_array().unwrap().len(), 2);

    let (_, body) = send(
        &app,
        post_json(&format!("/api/events/{bobs}/like"), json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(body["liked"], true);
    assert_eq!(body["like_count"], 1);

    let (status, _) = send(&app, delete(&format!("/api/events/{bobs}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, get(&format!("/api/events/{bobs}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn manual_event_ending_before_it_starts_is_rejected() {
    let app = app();
    send(&app, post_json("/api/users", json!({ "username": "alice" }))).await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/users/alice/events",
            json!({
                "world": { "name": "Lobby" },
                "companion_name": "bob",
                "start": "2024-05-01T21:00:00",
                "end": "2024-05-01T20:00:00",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
