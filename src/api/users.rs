use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, put},
};
use std::sync::Arc;
use tracing::info;

use super::dto::{StatusRequest, UserListResponse, UserResponse};
use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::{AdminOnly, AuthError, AuthGateway, Authenticated};
use crate::db::{AccountStatus, Database};
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub gateway: Arc<AuthGateway>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(get_me))
        .route("/{uuid}/status", put(set_status))
        .with_state(state)
}

async fn get_me(
    State(state): State<UsersState>,
    auth: Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.subject())
        .await
        .db_err("Failed to get user")?
        .ok_or(AuthError::AccountNotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Authenticated<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(UserListResponse { users }))
}

async fn set_status(
    State(state): State<UsersState>,
    auth: Authenticated<AdminOnly>,
    Path(uuid): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    let Json(payload) = payload?;

    if uuid == auth.subject() && payload.status == AccountStatus::Inactive {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let mut user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or(AuthError::AccountNotFound)?;

    state
        .db
        .users()
        .set_status(user.id, payload.status)
        .await
        .db_err("Failed to update status")?;
    user.status = payload.status;

    // Outstanding refresh tokens die with the account
    if payload.status == AccountStatus::Inactive {
        state
            .db
            .sessions()
            .clear(user.id)
            .await
            .db_err("Failed to clear session")?;
    }

    info!(
        subject = %user.uuid,
        status = payload.status.as_str(),
        admin = %auth.subject(),
        "Account status changed"
    );

    Ok(Json(UserResponse::from(&user)))
}
