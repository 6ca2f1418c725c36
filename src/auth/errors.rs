//! Authentication error taxonomy.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Classified rejection for every token, credential and session failure.
///
/// All variants are terminal for the current request. Only
/// [`AuthError::StoreUnavailable`] may be retried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No bearer token presented")]
    MissingToken,
    #[error("Token is malformed")]
    MalformedToken,
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Wrong token kind")]
    WrongTokenKind,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Refresh token has already been used or revoked")]
    RefreshReplay,
    #[error("Email is already registered")]
    DuplicateCredential,
    #[error("Invalid email or password")]
    InvalidCredential,
    #[error("Identity store unavailable")]
    StoreUnavailable,
    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Stable machine-readable name, used as the `error` field on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MissingToken",
            Self::MalformedToken => "MalformedToken",
            Self::InvalidSignature => "InvalidSignature",
            Self::TokenExpired => "TokenExpired",
            Self::WrongTokenKind => "WrongTokenKind",
            Self::InsufficientPermissions => "InsufficientPermissions",
            Self::AccountInactive => "AccountInactive",
            Self::AccountNotFound => "AccountNotFound",
            Self::RefreshReplay => "RefreshReplay",
            Self::DuplicateCredential => "DuplicateCredential",
            Self::InvalidCredential => "InvalidCredential",
            Self::StoreUnavailable => "StoreUnavailable",
            Self::Internal => "Internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::MalformedToken
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::WrongTokenKind
            | Self::AccountInactive
            | Self::RefreshReplay
            | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateCredential => StatusCode::CONFLICT,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }

    /// Wrap a store failure, logging the underlying cause.
    pub fn store(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "{}", context);
        Self::StoreUnavailable
    }
}

/// JSON body shared by every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorBody {
                error: self.code(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_unavailable_is_retryable() {
        assert!(AuthError::StoreUnavailable.is_retryable());
        assert!(!AuthError::RefreshReplay.is_retryable());
        assert!(!AuthError::TokenExpired.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::RefreshReplay.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::AccountNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::DuplicateCredential.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::InsufficientPermissions.status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
