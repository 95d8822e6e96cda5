use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use courier_api::auth::AppStateInner;
use courier_api::routes;
use courier_db::Database;

fn app() -> Router {
    let db = Database::open_in_memory().unwrap();
    let state = Arc::new(AppStateInner::new(db, "test-secret".into(), 1, 1).unwrap());
    routes::router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(path: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(path).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/register",
            None,
            json!({
                "username": username,
                "password": "correct horse",
                "first_name": "Test",
                "last_name": "User",
                "phone": "555-0100",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_conflict_on_duplicate_username() {
    let app = app();
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        post_json(
            "/register",
            None,
            json!({
                "username": "alice",
                "password": "another pass",
                "first_name": "Other",
                "last_name": "Alice",
                "phone": "555-0199",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["status"], 409);
    assert!(body["error"]["message"].as_str().unwrap().contains("alice"));
}

#[tokio::test]
async fn register_rejects_short_password() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/register",
            None,
            json!({
                "username": "alice",
                "password": "short",
                "first_name": "A",
                "last_name": "B",
                "phone": "555-0100",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
}

#[tokio::test]
async fn login_accepts_correct_and_rejects_wrong_password() {
    let app = app();
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        post_json(
            "/login",
            None,
            json!({"username": "alice", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, _) = send(
        &app,
        post_json(
            "/login",
            None,
            json!({"username": "alice", "password": "wrong horse"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // unknown user is indistinguishable from a wrong password
    let (status, _) = send(
        &app,
        post_json(
            "/login",
            None,
            json!({"username": "nobody", "password": "whatever pass"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_valid_token() {
    let app = app();

    let (status, _) = send(&app, get("/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/users", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_users_returns_public_fields_only() {
    let app = app();
    let token = register(&app, "alice").await;
    register(&app, "bob").await;

    let (status, body) = send(&app, get("/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert!(users[0].get("password").is_none());
    assert!(users[0].get("join_at").is_none());
}

#[tokio::test]
async fn profile_is_self_only_and_never_leaks_the_hash() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let (status, body) = send(&app, get("/users/alice", Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"]["join_at"].is_string());
    assert!(body["user"]["last_login_at"].is_string());
    assert!(body["user"].get("password").is_none());

    let (status, _) = send(&app, get("/users/alice", Some(&bob))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn message_lifecycle_end_to_end() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let eve = register(&app, "eve").await;

    // A sends to B
    let (status, body) = send(
        &app,
        post_json(
            "/messages",
            Some(&alice),
            json!({"to_username": "bob", "body": "hi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["message"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["message"]["from_username"], "alice");
    assert!(body["message"]["sent_at"].is_string());
    assert!(body["message"]["read_at"].is_null());

    // B fetches it, still unread
    let (status, body) = send(&app, get(&format!("/messages/{id}"), Some(&bob))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["body"], "hi");
    assert_eq!(body["message"]["from_user"]["username"], "alice");
    assert_eq!(body["message"]["to_user"]["username"], "bob");
    assert!(body["message"]["read_at"].is_null());

    // a third party never sees the body
    let (status, body) = send(&app, get(&format!("/messages/{id}"), Some(&eve))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("message").is_none());

    // sender may not mark it read
    let (status, _) = send(
        &app,
        post_json(&format!("/messages/{id}/read"), Some(&alice), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // recipient marks it read
    let (status, body) = send(
        &app,
        post_json(&format!("/messages/{id}/read"), Some(&bob), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["id"], id);
    assert!(body["message"]["read_at"].is_string());

    // read_at stays set
    let (_, body) = send(&app, get(&format!("/messages/{id}"), Some(&bob))).await;
    assert!(body["message"]["read_at"].is_string());
}

#[tokio::test]
async fn send_message_validates_recipient_and_body() {
    let app = app();
    let alice = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        post_json(
            "/messages",
            Some(&alice),
            json!({"to_username": "nobody", "body": "hi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);

    let (status, _) = send(
        &app,
        post_json(
            "/messages",
            Some(&alice),
            json!({"to_username": "alice", "body": "  "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn thread_queries_pair_messages_with_the_counterparty() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    for body in ["first", "second"] {
        let (status, _) = send(
            &app,
            post_json(
                "/messages",
                Some(&alice),
                json!({"to_username": "bob", "body": body}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // bob's inbox shows alice as the sender
    let (status, body) = send(&app, get("/users/bob/to", Some(&bob))).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    for m in messages {
        assert_eq!(m["from_user"]["username"], "alice");
        assert!(m.get("to_user").is_none());
    }

    // alice's outbox shows bob as the recipient, newest first
    let (status, body) = send(&app, get("/users/alice/from?limit=1", Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["to_user"]["username"], "bob");

    // threads are correct-user only
    let (status, _) = send(&app, get("/users/bob/to", Some(&alice))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_input_gets_the_structured_error_body() {
    let app = app();

    // body is not JSON at all
    let req = Request::post("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
    assert!(body["error"]["message"].is_string());

    let token = register(&app, "alice").await;

    // query param that does not parse
    let (status, body) = send(&app, get("/users/alice/from?limit=abc", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);

    // message id that is not a uuid
    let (status, body) = send(&app, get("/messages/not-a-uuid", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
}

#[tokio::test]
async fn login_bumps_last_login_timestamp() {
    let app = app();
    let token = register(&app, "alice").await;

    let (_, before) = send(&app, get("/users/alice", Some(&token))).await;
    let first_login = before["user"]["last_login_at"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (status, _) = send(
        &app,
        post_json(
            "/login",
            None,
            json!({"username": "alice", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = send(&app, get("/users/alice", Some(&token))).await;
    let second_login = after["user"]["last_login_at"].as_str().unwrap().to_string();

    let first: chrono::DateTime<chrono::Utc> = first_login.parse().unwrap();
    let second: chrono::DateTime<chrono::Utc> = second_login.parse().unwrap();
    assert!(second > first);
}
