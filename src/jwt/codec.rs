//! Compact token serialization: `base64url(header).base64url(claims).signature`.
//!
//! Pure functions, no state. Signature verification lives here too but is
//! only called by [`super::TokenVerifier`], which picks the key from the
//! expected token kind.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::TokenClaims;
use crate::auth::AuthError;

/// URL-safe base64 that accepts input with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Opaque signed token string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedToken(String);

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SignedToken> for String {
    fn from(token: SignedToken) -> Self {
        token.0
    }
}

/// Sign claims with the given key. Deterministic for identical inputs.
pub fn sign(claims: &TokenClaims, key: &EncodingKey) -> Result<SignedToken, AuthError> {
    jsonwebtoken::encode(&Header::new(ALGORITHM), claims, key)
        .map(SignedToken)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            AuthError::Internal
        })
}

/// Decode claims without checking the signature.
pub fn decode(token: &str) -> Result<TokenClaims, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken);
    };

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    let header_json = URL_SAFE_LENIENT
        .decode(header)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice::<Header>(&header_json).map_err(|_| AuthError::MalformedToken)?;

    let payload_json = URL_SAFE_LENIENT
        .decode(payload)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&payload_json).map_err(|_| AuthError::MalformedToken)
}

/// Check the signature with `key` and return the claims.
///
/// Expiry is not checked here: the verifier compares `exp` against its own
/// clock so that `exp == now` counts as expired.
pub fn verify_signature(token: &str, key: &DecodingKey) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<TokenClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                AuthError::InvalidSignature
            }
            _ => AuthError::MalformedToken,
        })
}
