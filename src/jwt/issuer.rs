use std::sync::Arc;

use super::codec::{self, SignedToken};
use super::{
    ACCESS_TOKEN_DURATION_SECS, JwtConfig, REFRESH_TOKEN_DURATION_SECS, TokenClaims, TokenKind,
};
use crate::auth::AuthError;
use crate::clock::SharedClock;
use crate::db::UserRole;

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: SignedToken,
    /// Issued at timestamp shared by both tokens (Unix seconds)
    pub issued_at: u64,
    pub access_expires_at: u64,
    pub refresh_expires_at: u64,
}

/// Builds access/refresh token pairs.
///
/// Issuing has no side effects. Persisting the refresh token's fingerprint is
/// the caller's job.
#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
    clock: SharedClock,
}

impl TokenIssuer {
    pub fn new(jwt: Arc<JwtConfig>, clock: SharedClock) -> Self {
        Self { jwt, clock }
    }

    pub fn issue_pair(
        &self,
        subject_id: &str,
        email: &str,
        role: UserRole,
        position: &str,
    ) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();

        let access_claims = TokenClaims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            role,
            position: position.to_string(),
            kind: TokenKind::Access,
            iat: now,
            exp: now + ACCESS_TOKEN_DURATION_SECS,
            jti: None,
        };

        let refresh_claims = TokenClaims {
            kind: TokenKind::Refresh,
            exp: now + REFRESH_TOKEN_DURATION_SECS,
            jti: Some(uuid::Uuid::new_v4().to_string()),
            ..access_claims.clone()
        };

        let access = codec::sign(&access_claims, self.jwt.encoding_key(TokenKind::Access))?;
        let refresh = codec::sign(&refresh_claims, self.jwt.encoding_key(TokenKind::Refresh))?;

        Ok(TokenPair {
            access,
            refresh,
            issued_at: now,
            access_expires_at: access_claims.exp,
            refresh_expires_at: refresh_claims.exp,
        })
    }
}
