//! The identity-store boundary used by the refresh coordinator.

use async_trait::async_trait;

use super::{Database, SessionRecord, User};
use crate::auth::AuthError;

/// What token rotation needs from the user store.
///
/// Implementations map their own failures to [`AuthError::StoreUnavailable`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch a user by subject id (UUID).
    async fn user_by_subject(&self, subject: &str) -> Result<Option<User>, AuthError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Overwrite the session record regardless of its current value.
    async fn persist_session(&self, user_id: i64, record: &SessionRecord) -> Result<(), AuthError>;

    /// Compare-and-swap: store `next` only if the current fingerprint equals
    /// `presented`. Returns whether the swap happened.
    async fn rotate_session(
        &self,
        user_id: i64,
        presented: &str,
        next: &SessionRecord,
    ) -> Result<bool, AuthError>;
}

#[async_trait]
impl IdentityStore for Database {
    async fn user_by_subject(&self, subject: &str) -> Result<Option<User>, AuthError> {
        self.users()
            .get_by_uuid(subject)
            .await
            .map_err(|e| AuthError::store("Failed to get user", e))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.users()
            .get_by_email(email)
            .await
            .map_err(|e| AuthError::store("Failed to get user", e))
    }

    async fn persist_session(&self, user_id: i64, record: &SessionRecord) -> Result<(), AuthError> {
        let updated = self
            .sessions()
            .store(user_id, record)
            .await
            .map_err(|e| AuthError::store("Failed to store session", e))?;
        if updated {
            Ok(())
        } else {
            Err(AuthError::AccountNotFound)
        }
    }

    async fn rotate_session(
        &self,
        user_id: i64,
        presented: &str,
        next: &SessionRecord,
    ) -> Result<bool, AuthError> {
        self.sessions()
            .rotate(user_id, presented, next)
            .await
            .map_err(|e| AuthError::store("Failed to rotate session", e))
    }
}
