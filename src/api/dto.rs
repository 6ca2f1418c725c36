//! Request and response bodies shared by the server and the client.

use serde::{Deserialize, Serialize};

use crate::client::timestamp;
use crate::db::{AccountStatus, User, UserRole, UserSummary};
use crate::refresh::IssuedSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub position: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub status: AccountStatus,
}

/// Public view of a user. `id` is the UUID, never the row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    pub role: UserRole,
    pub status: AccountStatus,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            position: user.position.clone(),
            role: user.role,
            status: user.status,
        }
    }
}

/// Body of `/login`, `/register` and `/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub issued_at: u64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub expires_at: u64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub refresh_token_expires_at: u64,
}

impl From<IssuedSession> for AuthResponse {
    fn from(session: IssuedSession) -> Self {
        Self {
            user: UserResponse::from(&session.user),
            token: session.pair.access.into_string(),
            refresh_token: session.pair.refresh.into_string(),
            issued_at: session.pair.issued_at,
            expires_at: session.pair.access_expires_at,
            refresh_token_expires_at: session.pair.refresh_expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}
