//! Client-side session record and freshness queries.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::backend::{BackendError, SessionBackend};
use super::timestamp;
use crate::api::dto::{AuthResponse, UserResponse};
use crate::clock::SharedClock;

/// Seconds before access-token expiry at which a session counts as stale.
pub const REFRESH_BUFFER_SECS: u64 = 5 * 60;

pub type SessionUser = UserResponse;

/// Everything a client holds after logging in. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: SessionUser,
    /// Access token expiry (Unix seconds)
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub expires_at: u64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub issued_at: u64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub refresh_token_expires_at: u64,
}

impl From<AuthResponse> for ClientSession {
    fn from(response: AuthResponse) -> Self {
        Self {
            access_token: response.token,
            refresh_token: response.refresh_token,
            user: response.user,
            expires_at: response.expires_at,
            issued_at: response.issued_at,
            refresh_token_expires_at: response.refresh_token_expires_at,
        }
    }
}

/// Freshness of the stored session at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Missing,
    Fresh,
    /// Access token expired or inside the refresh buffer; refresh token usable
    Stale,
    RefreshExpired,
}

/// Query and update surface over the current [`ClientSession`].
///
/// Reads come from an in-memory copy; writes go to the backend first and
/// replace the copy only once persisted. Never touches the network.
pub struct SessionStore<B> {
    backend: B,
    clock: SharedClock,
    buffer_secs: u64,
    current: RwLock<Option<ClientSession>>,
}

impl<B: SessionBackend> SessionStore<B> {
    /// Open the store, loading any persisted session. A corrupt record is
    /// discarded rather than failing startup.
    pub fn open(backend: B, clock: SharedClock) -> Result<Self, BackendError> {
        let current = match backend.load() {
            Ok(session) => session,
            Err(BackendError::Corrupt(reason)) => {
                warn!(reason = %reason, "Discarding corrupt stored session");
                backend.clear()?;
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            backend,
            clock,
            buffer_secs: REFRESH_BUFFER_SECS,
            current: RwLock::new(current),
        })
    }

    pub fn with_buffer(mut self, buffer_secs: u64) -> Self {
        self.buffer_secs = buffer_secs;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn get(&self) -> Option<ClientSession> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }

    fn query<T>(&self, f: impl FnOnce(Option<&ClientSession>, u64) -> T) -> T {
        let now = self.clock.now();
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        f(current.as_ref(), now)
    }

    /// The access token outlives the refresh buffer.
    pub fn is_valid(&self) -> bool {
        let buffer = self.buffer_secs;
        self.query(|s, now| s.is_some_and(|s| s.expires_at > now.saturating_add(buffer)))
    }

    pub fn is_expired(&self) -> bool {
        self.query(|s, now| s.is_none_or(|s| s.expires_at <= now))
    }

    pub fn needs_refresh(&self) -> bool {
        !self.is_valid()
    }

    pub fn is_refresh_token_expired(&self) -> bool {
        self.query(|s, now| s.is_none_or(|s| s.refresh_token_expires_at <= now))
    }

    /// Classify the session against a single clock reading.
    pub fn freshness(&self) -> Freshness {
        let buffer = self.buffer_secs;
        self.query(|s, now| match s {
            None => Freshness::Missing,
            Some(s) if s.refresh_token_expires_at <= now => Freshness::RefreshExpired,
            Some(s) if s.expires_at > now.saturating_add(buffer) => Freshness::Fresh,
            Some(_) => Freshness::Stale,
        })
    }

    pub fn set(&self, session: ClientSession) -> Result<(), BackendError> {
        self.backend.save(&session)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), BackendError> {
        self.backend.clear()?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    /// Re-read the backend and adopt whatever it holds, picking up sessions
    /// written by another process or store sharing the same backend.
    pub fn reload(&self) -> Result<Option<ClientSession>, BackendError> {
        let session = self.backend.load()?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session.clone();
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::db::{AccountStatus, UserRole};
    use std::sync::Arc;

    pub(crate) fn sample_user() -> SessionUser {
        SessionUser {
            id: "7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            position: "Analyst".to_string(),
            role: UserRole::User,
            status: AccountStatus::Active,
        }
    }

    pub(crate) fn session_at(issued_at: u64, tag: &str) -> ClientSession {
        ClientSession {
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            user: sample_user(),
            expires_at: issued_at + 900,
            issued_at,
            refresh_token_expires_at: issued_at + 604_800,
        }
    }

    fn store_at(now: u64) -> (SessionStore<MemoryBackend>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = SessionStore::open(MemoryBackend::default(), clock.clone()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_empty_store() {
        let (store, _clock) = store_at(1_000);

        assert!(!store.is_valid());
        assert!(store.is_expired());
        assert!(store.needs_refresh());
        assert!(store.is_refresh_token_expired());
        assert_eq!(store.freshness(), Freshness::Missing);
    }

    #[test]
    fn test_refresh_buffer_boundary() {
        let (store, clock) = store_at(1_000);
        store.set(session_at(1_000, "a")).unwrap();

        // 900 s lifetime, 300 s buffer: fresh until 600 s have passed
        clock.set(1_599);
        assert!(store.is_valid());
        assert!(!store.needs_refresh());
        assert_eq!(store.freshness(), Freshness::Fresh);

        clock.set(1_600);
        assert!(!store.is_valid());
        assert!(store.needs_refresh());
        assert!(!store.is_expired());
        assert_eq!(store.freshness(), Freshness::Stale);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let (store, clock) = store_at(1_000);
        store.set(session_at(1_000, "a")).unwrap();

        clock.set(1_899);
        assert!(!store.is_expired());
        clock.set(1_900);
        assert!(store.is_expired());

        clock.set(1_000 + 604_800);
        assert!(store.is_refresh_token_expired());
        assert_eq!(store.freshness(), Freshness::RefreshExpired);
    }

    #[test]
    fn test_set_replaces_and_clear_deletes() {
        let (store, _clock) = store_at(1_000);
        store.set(session_at(1_000, "a")).unwrap();
        store.set(session_at(1_000, "b")).unwrap();

        assert_eq!(store.access_token().as_deref(), Some("access-b"));
        assert_eq!(store.backend().load().unwrap(), Some(session_at(1_000, "b")));

        store.clear().unwrap();
        assert_eq!(store.get(), None);
        assert_eq!(store.backend().load().unwrap(), None);
    }

    #[test]
    fn test_open_loads_persisted_session() {
        let backend = MemoryBackend::default();
        backend.save(&session_at(1_000, "a")).unwrap();

        let store = SessionStore::open(backend, Arc::new(ManualClock::new(1_000))).unwrap();
        assert_eq!(store.get(), Some(session_at(1_000, "a")));
    }

    #[test]
    fn test_deserializes_rfc3339_timestamps() {
        let json = serde_json::json!({
            "accessToken": "a",
            "refreshToken": "r",
            "user": sample_user(),
            "expiresAt": "2023-11-14T22:28:20Z",
            "issuedAt": 1_700_000_000u64,
            "refreshTokenExpiresAt": "2023-11-21T22:13:20+00:00",
        });

        let session: ClientSession = serde_json::from_value(json).unwrap();
        assert_eq!(session.issued_at, 1_700_000_000);
        assert_eq!(session.expires_at, 1_700_000_900);
        assert_eq!(session.refresh_token_expires_at, 1_700_604_800);
    }
}
