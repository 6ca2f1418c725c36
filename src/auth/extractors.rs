//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AuthError;
use super::gateway::{authorization_header, bearer_token};
use super::policy::{AnyRole, RoleConstraint};
use super::state::HasAuthBackend;
use crate::jwt::TokenClaims;

/// Extractor for endpoints that require a valid access token whose role is
/// in `R::PERMITTED`. Rejects with the gateway's classification.
pub struct Authenticated<R: RoleConstraint = AnyRole> {
    pub claims: TokenClaims,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Authenticated<R> {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

impl<S, R> FromRequestParts<S> for Authenticated<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = state
            .gateway()
            .authorize_headers(&parts.headers, R::PERMITTED)
            .into_result()?;

        Ok(Authenticated {
            claims,
            _role: PhantomData,
        })
    }
}

/// Raw bearer token, unverified. Used by `/refresh`, where the bearer is a
/// refresh token and verification belongs to the refresh coordinator.
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(authorization_header(&parts.headers))
            .map(|token| BearerToken(token.to_string()))
            .ok_or(AuthError::MissingToken)
    }
}
