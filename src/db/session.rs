//! Refresh-token rotation ledger.
//!
//! Each user row carries at most one live session: the fingerprint of the
//! current refresh token and its expiry. Access tokens are stateless and
//! never stored.

use sqlx::sqlite::SqlitePool;

/// Server-side session marker stored on the user record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// Hex SHA-256 of the current refresh token
    pub fingerprint: Option<String>,
    /// Refresh token expiry (Unix seconds)
    pub expires_at: Option<u64>,
}

impl SessionRecord {
    pub fn issued(fingerprint: String, expires_at: u64) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            expires_at: Some(expires_at),
        }
    }

    pub(super) fn from_columns(fingerprint: Option<String>, expires_at: Option<i64>) -> Self {
        Self {
            fingerprint,
            expires_at: expires_at.map(|t| t.max(0) as u64),
        }
    }

    /// Whether `fingerprint` is the live refresh token at `now`.
    pub fn accepts(&self, fingerprint: &str, now: u64) -> bool {
        match (&self.fingerprint, self.expires_at) {
            (Some(current), Some(expires_at)) => current == fingerprint && now < expires_at,
            _ => false,
        }
    }
}

/// Store for the per-user session record.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<SessionRecord>, sqlx::Error> {
        let row: Option<(Option<String>, Option<i64>)> = sqlx::query_as(
            "SELECT refresh_fingerprint, refresh_expires_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(fingerprint, expires_at)| SessionRecord::from_columns(fingerprint, expires_at)))
    }

    /// Unconditionally replace the session record (login, registration).
    pub async fn store(&self, user_id: i64, record: &SessionRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_fingerprint = ?, refresh_expires_at = ? WHERE id = ?",
        )
        .bind(record.fingerprint.as_deref())
        .bind(record.expires_at.map(|t| t as i64))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the session record only if the stored fingerprint still equals
    /// `presented`. Returns false when another rotation got there first.
    pub async fn rotate(
        &self,
        user_id: i64,
        presented: &str,
        next: &SessionRecord,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_fingerprint = ?, refresh_expires_at = ?
             WHERE id = ? AND refresh_fingerprint = ?",
        )
        .bind(next.fingerprint.as_deref())
        .bind(next.expires_at.map(|t| t as i64))
        .bind(user_id)
        .bind(presented)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Revoke the session (logout, deactivation).
    pub async fn clear(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_fingerprint = NULL, refresh_expires_at = NULL
             WHERE id = ? AND refresh_fingerprint IS NOT NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear all session records whose refresh token expired at or before `now`.
    pub async fn clear_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_fingerprint = NULL, refresh_expires_at = NULL
             WHERE refresh_expires_at IS NOT NULL AND refresh_expires_at <= ?",
        )
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_requires_match_and_unexpired() {
        let record = SessionRecord::issued("abc".to_string(), 100);

        assert!(record.accepts("abc", 99));
        assert!(!record.accepts("abc", 100));
        assert!(!record.accepts("abd", 50));
        assert!(!SessionRecord::default().accepts("abc", 0));
    }
}
