//! Tests for the account endpoints under `/users`.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::*;
use serde_json::json;
use tokenkeep::db::{AccountStatus, UserRole};

#[tokio::test]
async fn test_get_me() {
    let app = create_test_app().await;
    let user = create_user(&app.db, "ada@example.com", UserRole::Editor).await;
    let body = login(&app, "ada@example.com").await;

    let response = app
        .send(with_bearer("GET", "/users/me", &access_token(&body)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let me = body_json(response).await;
    assert_eq!(me["id"], user.uuid);
    assert_eq!(me["role"], "editor");
    assert_eq!(me["status"], "active");
    assert_eq!(me["lastName"], "User");
}

#[tokio::test]
async fn test_get_me_requires_token() {
    let app = create_test_app().await;

    let response = app
        .send(
            Request::builder()
                .uri("/users/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    expect_error(response, StatusCode::UNAUTHORIZED, "MissingToken").await;
}

#[tokio::test]
async fn test_list_users_requires_admin() {
    let app = create_test_app().await;
    create_user(&app.db, "user@example.com", UserRole::User).await;
    create_user(&app.db, "editor@example.com", UserRole::Editor).await;

    for email in ["user@example.com", "editor@example.com"] {
        let body = login(&app, email).await;
        let response = app
            .send(with_bearer("GET", "/users", &access_token(&body)))
            .await;
        expect_error(response, StatusCode::FORBIDDEN, "InsufficientPermissions").await;
    }
}

#[tokio::test]
async fn test_list_users_as_admin() {
    let app = create_test_app().await;
    create_user(&app.db, "admin@example.com", UserRole::Admin).await;
    create_user(&app.db, "user@example.com", UserRole::User).await;
    let body = login(&app, "admin@example.com").await;

    let response = app
        .send(with_bearer("GET", "/users", &access_token(&body)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let list = body_json(response).await;
    let users = list["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("passwordHash").is_none()));
    assert!(users.iter().any(|u| u["email"] == "user@example.com"));
}

#[tokio::test]
async fn test_deactivation_revokes_session() {
    let app = create_test_app().await;
    create_user(&app.db, "admin@example.com", UserRole::Admin).await;
    let target = create_user(&app.db, "user@example.com", UserRole::User).await;
    let admin = login(&app, "admin@example.com").await;
    let session = login(&app, "user@example.com").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", target.uuid),
            &access_token(&admin),
            json!({ "status": "inactive" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "inactive");

    // The still-unexpired access token no longer verifies
    let response = app
        .send(with_bearer("POST", "/verify", &access_token(&session)))
        .await;
    expect_error(response, StatusCode::UNAUTHORIZED, "AccountInactive").await;

    let response = app
        .send(with_bearer("POST", "/refresh", &refresh_token(&session)))
        .await;
    expect_error(response, StatusCode::UNAUTHORIZED, "AccountInactive").await;

    let stored = app.db.users().get_by_id(target.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AccountStatus::Inactive);
    assert!(stored.session.fingerprint.is_none());
}

#[tokio::test]
async fn test_reactivation_allows_login() {
    let app = create_test_app().await;
    create_user(&app.db, "admin@example.com", UserRole::Admin).await;
    let target = create_user(&app.db, "user@example.com", UserRole::User).await;
    app.db
        .users()
        .set_status(target.id, AccountStatus::Inactive)
        .await
        .unwrap();
    let admin = login(&app, "admin@example.com").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", target.uuid),
            &access_token(&admin),
            json!({ "status": "active" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    login(&app, "user@example.com").await;
}

#[tokio::test]
async fn test_set_status_requires_admin() {
    let app = create_test_app().await;
    create_user(&app.db, "editor@example.com", UserRole::Editor).await;
    let target = create_user(&app.db, "user@example.com", UserRole::User).await;
    let editor = login(&app, "editor@example.com").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", target.uuid),
            &access_token(&editor),
            json!({ "status": "inactive" }),
        ))
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "InsufficientPermissions").await;

    let stored = app.db.users().get_by_id(target.id).await.unwrap().unwrap();
    assert!(stored.is_active());
}

#[tokio::test]
async fn test_set_status_errors() {
    let app = create_test_app().await;
    let admin_user = create_user(&app.db, "admin@example.com", UserRole::Admin).await;
    let admin = login(&app, "admin@example.com").await;
    let token = access_token(&admin);

    let response = app
        .send(put_json_with_bearer(
            "/users/not-a-uuid/status",
            &token,
            json!({ "status": "inactive" }),
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BadRequest").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", uuid::Uuid::new_v4()),
            &token,
            json!({ "status": "inactive" }),
        ))
        .await;
    expect_error(response, StatusCode::NOT_FOUND, "AccountNotFound").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", admin_user.uuid),
            &token,
            json!({ "status": "inactive" }),
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BadRequest").await;

    let response = app
        .send(put_json_with_bearer(
            &format!("/users/{}/status", admin_user.uuid),
            &token,
            json!({ "status": "suspended" }),
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BadRequest").await;
}
