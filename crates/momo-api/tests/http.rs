use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use momo_api::{AppState, AppStateInner, auth::create_token, router};
use momo_db::Database;
use momo_gateway::{ConnectionRegistry, SessionConfig};

const SECRET: &str = "test-secret";

fn app() -> (Router, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        jwt_secret: SECRET.into(),
        registry: ConnectionRegistry::new(),
        session: SessionConfig::default(),
    });
    (router(state.clone()), state)
}

/// Insert a user directly and mint a token, skipping password hashing.
fn user(state: &AppState, name: &str) -> (i64, String) {
    let id = state.db.create_user(name, "unused").unwrap();
    (id, create_token(SECRET, id).unwrap())
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn register_login_and_me() {
    let (app, _) = app();

    let (status, registered) = call(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({"name": "  alice  ", "password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = registered["user_id"].as_i64().unwrap();

    let (status, login) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({"id": id, "password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["name"], "alice");
    let token = login["token"].as_str().unwrap();

    let (status, me) = call(&app, Method::GET, "/api/v1/user/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, json!({"id": id, "name": "alice"}));

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({"id": id, "password": "wrong password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({"id": id + 100, "password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let (app, _) = app();

    for body in [
        json!({"name": "   ", "password": "long enough"}),
        json!({"name": "x".repeat(33), "password": "long enough"}),
        json!({"name": "bob", "password": "short"}),
    ] {
        let (status, _) = call(&app, Method::POST, "/register", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", body);
    }
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let (app, state) = app();
    let (id, token) = user(&state, "carol");

    let (status, _) = call(&app, Method::GET, "/api/v1/user/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/api/v1/user/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = create_token("another-secret", id).unwrap();
    let (status, _) = call(&app, Method::GET, "/api/v1/user/me", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // query parameter, as used by WebSocket clients
    let uri = format!("/api/v1/user/me?token={}", token);
    let (status, me) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
}

#[tokio::test]
async fn group_lifecycle() {
    let (app, state) = app();
    let (owner, owner_token) = user(&state, "owner");
    let (guest, guest_token) = user(&state, "guest");

    let (status, group) = call(
        &app,
        Method::POST,
        "/api/v1/group/create",
        Some(&owner_token),
        Some(json!({"name": "lunch"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["owner_id"], owner);
    let group_id = group["id"].as_i64().unwrap();

    let members_body = Some(json!({"group_id": group_id}));
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/group/member",
        Some(&guest_token),
        members_body.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/group/join",
        Some(&guest_token),
        members_body.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, members) = call(
        &app,
        Method::POST,
        "/api/v1/group/member",
        Some(&guest_token),
        members_body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = members
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![owner, guest]);

    let (status, groups) = call(&app, Method::GET, "/api/v1/group/list", Some(&guest_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups[0]["name"], "lunch");

    for uri in ["/api/v1/group/join", "/api/v1/group/member"] {
        let (status, _) = call(
            &app,
            Method::POST,
            uri,
            Some(&guest_token),
            Some(json!({"group_id": group_id + 50})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn message_stream_rejects_bad_conversation_id_before_upgrade() {
    let (app, state) = app();
    let (_, token) = user(&state, "dave");

    for uri in [
        "/api/v1/ws/message",
        "/api/v1/ws/message?conv_id=abc",
        "/api/v1/ws/message?conv_id=0",
        "/api/v1/ws/message?conv_id=-7",
    ] {
        let (status, body) = call(&app, Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }

    // a valid id still needs a real upgrade request
    let (status, body) = call(&app, Method::GET, "/api/v1/ws/message?conv_id=5", Some(&token), None).await;
    assert!(status.is_client_error());
    assert!(body.get("error").is_none());
    assert_eq!(state.registry.conversation_count(), 0);
}
