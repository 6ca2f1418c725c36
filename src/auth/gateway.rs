//! Request-level guard for access tokens.
//!
//! The gateway only classifies. It never refreshes: refreshing is an explicit
//! client operation, so authorizing the same header twice gives the same
//! answer and touches nothing.

use axum::http::{HeaderMap, header};

use super::AuthError;
use super::policy::require_role;
use crate::db::UserRole;
use crate::jwt::{TokenClaims, TokenKind, TokenVerifier};

/// Outcome of authorizing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Authorized(TokenClaims),
    Unauthorized(AuthError),
}

impl AccessDecision {
    /// The token is well-formed and genuine but stale; the caller should
    /// refresh and retry.
    pub fn needs_refresh(&self) -> bool {
        matches!(self, AccessDecision::Unauthorized(AuthError::TokenExpired))
    }

    pub fn into_result(self) -> Result<TokenClaims, AuthError> {
        match self {
            AccessDecision::Authorized(claims) => Ok(claims),
            AccessDecision::Unauthorized(reason) => Err(reason),
        }
    }
}

#[derive(Clone)]
pub struct AuthGateway {
    verifier: TokenVerifier,
}

impl AuthGateway {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authorize a raw `Authorization` header value for the permitted roles.
    pub fn authorize(&self, raw_header: Option<&str>, permitted: &[UserRole]) -> AccessDecision {
        let decision = bearer_token(raw_header)
            .ok_or(AuthError::MissingToken)
            .and_then(|token| self.verifier.verify(token, TokenKind::Access))
            .and_then(|claims| require_role(&claims, permitted).map(|_| claims));

        match decision {
            Ok(claims) => AccessDecision::Authorized(claims),
            Err(reason) => AccessDecision::Unauthorized(reason),
        }
    }

    /// Same as [`Self::authorize`], reading the header from a header map.
    pub fn authorize_headers(&self, headers: &HeaderMap, permitted: &[UserRole]) -> AccessDecision {
        self.authorize(authorization_header(headers), permitted)
    }
}

/// The `Authorization` header as a string, if present and valid UTF-8.
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(raw_header: Option<&str>) -> Option<&str> {
    let (scheme, token) = raw_header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}
