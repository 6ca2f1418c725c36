mod auth;
pub mod dto;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthGateway;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::refresh::RefreshCoordinator;

pub use auth::AuthState;
pub use error::ApiError;
pub use users::UsersState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    gateway: Arc<AuthGateway>,
    coordinator: Arc<RefreshCoordinator<Database>>,
    rate_limit_config: Arc<RateLimitConfig>,
    no_signup: bool,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        gateway: gateway.clone(),
        coordinator,
        rate_limit_config,
        no_signup,
    };

    let users_state = users::UsersState { db, gateway };

    Router::new()
        .merge(auth::router(auth_state))
        .nest("/users", users::router(users_state))
}
