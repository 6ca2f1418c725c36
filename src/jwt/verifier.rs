use std::sync::Arc;

use super::codec;
use super::{JwtConfig, TokenClaims, TokenKind};
use crate::auth::AuthError;
use crate::clock::SharedClock;

/// Decodes a token and checks kind, signature and expiry.
#[derive(Clone)]
pub struct TokenVerifier {
    jwt: Arc<JwtConfig>,
    clock: SharedClock,
}

impl TokenVerifier {
    pub fn new(jwt: Arc<JwtConfig>, clock: SharedClock) -> Self {
        Self { jwt, clock }
    }

    /// Verify `token` as a token of `expected` kind.
    ///
    /// The signing key is always the one for `expected`, never one inferred
    /// from the token. A token whose `exp` equals the current second is
    /// already expired.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, AuthError> {
        let unverified = codec::decode(token)?;
        if unverified.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }

        let claims = codec::verify_signature(token, self.jwt.decoding_key(expected))?;
        if claims.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }

        if self.clock.now() >= claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}
