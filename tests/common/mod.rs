#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use serde_json::Value;
use std::sync::Arc;
use tokenkeep::{
    ServerConfig,
    auth::password::hash_password,
    clock::ManualClock,
    create_app,
    db::{Database, NewUser, User, UserRole},
    rate_limit::RateLimitSettings,
};
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-at-least-32-bytes-long";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Create a test app on an in-memory database with a manual clock.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

pub async fn create_test_app_with(customize: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::starting_now());

    let mut config = ServerConfig::new(db.clone(), TEST_SECRET.to_vec());
    config.clock = clock.clone();
    config.rate_limits = RateLimitSettings::relaxed();
    customize(&mut config);

    TestApp {
        app: create_app(&config),
        db,
        clock,
    }
}

/// Insert an active user directly, bypassing `/register`.
pub async fn create_user(db: &Database, email: &str, role: UserRole) -> User {
    let uuid = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(TEST_PASSWORD).unwrap();
    db.users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            password_hash: &password_hash,
            first_name: "Test",
            last_name: "User",
            position: "Tester",
            role,
        })
        .await
        .unwrap();
    db.users().get_by_uuid(&uuid).await.unwrap().unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn put_json_with_bearer(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert an error response and return its body.
pub async fn expect_error(response: Response<Body>, status: StatusCode, code: &str) -> Value {
    assert_eq!(response.status(), status);
    let body = body_json(response).await;
    assert_eq!(body["error"], code, "unexpected body: {}", body);
    assert!(body["message"].is_string());
    body
}

/// Log in through `/login` and return the response body.
pub async fn login(app: &TestApp, email: &str) -> Value {
    let response = app
        .send(post_json(
            "/login",
            serde_json::json!({ "email": email, "password": TEST_PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

pub fn access_token(body: &Value) -> String {
    body["token"].as_str().unwrap().to_string()
}

pub fn refresh_token(body: &Value) -> String {
    body["refreshToken"].as_str().unwrap().to_string()
}
