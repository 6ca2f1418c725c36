//! Role-based access policy.

use super::AuthError;
use crate::db::UserRole;
use crate::jwt::TokenClaims;

/// The one role check every protected route goes through.
pub fn require_role(claims: &TokenClaims, permitted: &[UserRole]) -> Result<(), AuthError> {
    if permitted.contains(&claims.role) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}

/// Compile-time role set for the [`super::Authenticated`] extractor.
pub trait RoleConstraint: Send + Sync + 'static {
    const PERMITTED: &'static [UserRole];
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const PERMITTED: &'static [UserRole] = UserRole::ALL;
}

/// Admins only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const PERMITTED: &'static [UserRole] = &[UserRole::Admin];
}
