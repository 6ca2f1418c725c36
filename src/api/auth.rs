use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::dto::{AuthResponse, LoginRequest, RegisterRequest, UserResponse, VerifyResponse};
use super::error::{ApiError, ResultExt, validate_email};
use crate::auth::password::{
    hash_password_blocking, verify_dummy_blocking, verify_password_blocking,
};
use crate::auth::{AuthError, AuthGateway, Authenticated, BearerToken};
use crate::db::{Database, NewUser, UserRole, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::refresh::RefreshCoordinator;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 256;
const MAX_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub gateway: Arc<AuthGateway>,
    pub coordinator: Arc<RefreshCoordinator<Database>>,
    pub rate_limit_config: Arc<RateLimitConfig>,
    pub no_signup: bool,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/verify", post(verify))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(register_router)
        .merge(session_router)
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim();

    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let Some(user) = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to get user")?
    else {
        verify_dummy_blocking(payload.password).await;
        return Err(AuthError::InvalidCredential.into());
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await {
        warn!(subject = %user.uuid, "Login with wrong password");
        return Err(AuthError::InvalidCredential.into());
    }

    if !user.is_active() {
        return Err(AuthError::AccountInactive.into());
    }

    let session = state.coordinator.start_session(user).await?;
    info!(subject = %session.user.uuid, "User logged in");

    Ok(Json(AuthResponse::from(session)))
}

fn validate_name(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "{} cannot be longer than {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    if state.no_signup {
        return Err(ApiError::forbidden("Signups are disabled"));
    }

    let Json(payload) = payload?;
    let email = payload.email.trim();
    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    let position = payload.position.trim();

    validate_email(email)?;
    validate_name("First name", first_name)?;
    validate_name("Last name", last_name)?;
    validate_name("Position", position)?;

    let password_len = payload.password.chars().count();
    if password_len < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password_len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request("Password is too long"));
    }

    let available = state
        .db
        .users()
        .is_email_available(email)
        .await
        .db_err("Failed to check email availability")?;

    if !available {
        return Err(AuthError::DuplicateCredential.into());
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let id = match state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            password_hash: &password_hash,
            first_name,
            last_name,
            position,
            role: UserRole::User,
        })
        .await
    {
        Ok(id) => id,
        // Lost a race with a concurrent registration for the same email
        Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateCredential.into()),
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or(AuthError::AccountNotFound)?;

    let session = state.coordinator.start_session(user).await?;
    info!(subject = %session.user.uuid, "User registered");

    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

async fn refresh(
    State(state): State<AuthState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.coordinator.refresh(&token).await?;
    Ok(Json(AuthResponse::from(session)))
}

async fn verify(
    State(state): State<AuthState>,
    auth: Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.subject())
        .await
        .db_err("Failed to get user")?
        .ok_or(AuthError::AccountNotFound)?;

    if !user.is_active() {
        return Err(AuthError::AccountInactive.into());
    }

    Ok(Json(VerifyResponse {
        valid: true,
        user: UserResponse::from(&user),
    }))
}

async fn logout(
    State(state): State<AuthState>,
    auth: Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.subject())
        .await
        .db_err("Failed to get user")?;

    if let Some(user) = user {
        let cleared = state
            .db
            .sessions()
            .clear(user.id)
            .await
            .db_err("Failed to clear session")?;
        if cleared {
            info!(subject = %user.uuid, "User logged out");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
