//! Refresh-token rotation.
//!
//! Each refresh token can be exchanged exactly once. The user's session
//! record holds the fingerprint of the one live refresh token; a rotation
//! swaps it for the new token's fingerprint with compare-and-swap, so a
//! consumed token fails with [`AuthError::RefreshReplay`] even though its own
//! `exp` has not passed.
//!
//! Concurrent refreshes presenting the same token are coalesced: the first
//! caller performs the rotation and every caller that arrives while it is in
//! flight receives the same result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::auth::AuthError;
use crate::clock::SharedClock;
use crate::db::{IdentityStore, SessionRecord, User};
use crate::jwt::{TokenIssuer, TokenKind, TokenPair, TokenVerifier, fingerprint};

/// Result of a successful login, registration or rotation.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub pair: TokenPair,
}

type InFlight = Arc<OnceCell<Result<IssuedSession, AuthError>>>;

pub struct RefreshCoordinator<S> {
    store: S,
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    clock: SharedClock,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

/// Removes a finished or abandoned rotation from the in-flight map.
///
/// Runs on completion and on cancellation. An uninitialized cell is only
/// removed by its last holder, so a rotation still awaited elsewhere stays
/// shared.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, InFlight>>,
    key: &'a str,
    cell: InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let cell = std::mem::take(&mut self.cell);
        let current = in_flight
            .get(self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &cell));
        // The map and this guard are the only holders left
        if current && (cell.initialized() || Arc::strong_count(&cell) <= 2) {
            in_flight.remove(self.key);
        }
        // Dropped under the lock so the next holder sees an accurate count
        drop(cell);
    }
}

impl<S: IdentityStore> RefreshCoordinator<S> {
    pub fn new(store: S, issuer: TokenIssuer, verifier: TokenVerifier, clock: SharedClock) -> Self {
        Self {
            store,
            issuer,
            verifier,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a new session for `user`: issue a pair and record its refresh
    /// fingerprint, replacing any previous session.
    pub async fn start_session(&self, user: User) -> Result<IssuedSession, AuthError> {
        let pair = self
            .issuer
            .issue_pair(&user.uuid, &user.email, user.role, &user.position)?;
        let record = SessionRecord::issued(fingerprint(pair.refresh.as_str()), pair.refresh_expires_at);
        self.store.persist_session(user.id, &record).await?;

        info!(subject = %user.uuid, "Session started");
        Ok(IssuedSession {
            user: User {
                session: record,
                ..user
            },
            pair,
        })
    }

    /// Exchange a refresh token for a new pair, invalidating the old token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        let presented = fingerprint(refresh_token);

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.entry(presented.clone()).or_default().clone()
        };
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            key: &presented,
            cell,
        };

        let result = guard
            .cell
            .get_or_init(|| self.rotate(refresh_token, &presented))
            .await
            .clone();

        drop(guard);
        result
    }

    async fn rotate(&self, refresh_token: &str, presented: &str) -> Result<IssuedSession, AuthError> {
        let claims = self.verifier.verify(refresh_token, TokenKind::Refresh)?;

        let user = self
            .store
            .user_by_subject(&claims.sub)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        if !user.session.accepts(presented, self.clock.now()) {
            warn!(subject = %user.uuid, "Rejected replayed or revoked refresh token");
            return Err(AuthError::RefreshReplay);
        }

        let pair = self
            .issuer
            .issue_pair(&user.uuid, &user.email, user.role, &user.position)?;
        let record = SessionRecord::issued(fingerprint(pair.refresh.as_str()), pair.refresh_expires_at);

        if !self.store.rotate_session(user.id, presented, &record).await? {
            warn!(subject = %user.uuid, "Lost refresh rotation race");
            return Err(AuthError::RefreshReplay);
        }

        info!(subject = %user.uuid, "Refresh token rotated");
        Ok(IssuedSession {
            user: User {
                session: record,
                ..user
            },
            pair,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{Database, NewUser, UserRole};
    use crate::jwt::JwtConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Wraps the database, counting rotations and delaying them so that
    /// concurrent callers are guaranteed to overlap.
    struct SlowStore {
        db: Database,
        rotations: AtomicUsize,
    }

    #[async_trait]
    impl IdentityStore for SlowStore {
        async fn user_by_subject(&self, subject: &str) -> Result<Option<User>, AuthError> {
            self.db.user_by_subject(subject).await
        }

        async fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
            self.db.user_by_email(email).await
        }

        async fn persist_session(&self, user_id: i64, record: &SessionRecord) -> Result<(), AuthError> {
            self.db.persist_session(user_id, record).await
        }

        async fn rotate_session(
            &self,
            user_id: i64,
            presented: &str,
            next: &SessionRecord,
        ) -> Result<bool, AuthError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let swapped = self.db.rotate_session(user_id, presented, next).await?;
            if swapped {
                self.rotations.fetch_add(1, Ordering::SeqCst);
            }
            Ok(swapped)
        }
    }

    /// Never answers the account lookup, so rotations hang until cancelled.
    struct StalledStore {
        db: Database,
    }

    #[async_trait]
    impl IdentityStore for StalledStore {
        async fn user_by_subject(&self, _subject: &str) -> Result<Option<User>, AuthError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }

        async fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
            self.db.user_by_email(email).await
        }

        async fn persist_session(&self, user_id: i64, record: &SessionRecord) -> Result<(), AuthError> {
            self.db.persist_session(user_id, record).await
        }

        async fn rotate_session(
            &self,
            user_id: i64,
            presented: &str,
            next: &SessionRecord,
        ) -> Result<bool, AuthError> {
            self.db.rotate_session(user_id, presented, next).await
        }
    }

    async fn seed_user(db: &Database, email: &str) -> User {
        db.users()
            .create(&NewUser {
                uuid: &uuid::Uuid::new_v4().to_string(),
                email,
                password_hash: "unused",
                first_name: "Ada",
                last_name: "Lovelace",
                position: "Analyst",
                role: UserRole::User,
            })
            .await
            .unwrap();
        db.users().get_by_email(email).await.unwrap().unwrap()
    }

    fn coordinator<S: IdentityStore>(store: S, clock: Arc<ManualClock>) -> RefreshCoordinator<S> {
        let jwt = Arc::new(JwtConfig::new(b"access-secret", b"refresh-secret"));
        RefreshCoordinator::new(
            store,
            TokenIssuer::new(jwt.clone(), clock.clone()),
            TokenVerifier::new(jwt, clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_token() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let clock = Arc::new(ManualClock::starting_now());
        let coordinator = coordinator(db.clone(), clock.clone());

        let session = coordinator.start_session(user).await.unwrap();
        let old_refresh = session.pair.refresh.clone();

        clock.advance(60);
        let rotated = coordinator.refresh(old_refresh.as_str()).await.unwrap();
        assert_ne!(rotated.pair.refresh, old_refresh);

        // Re-presenting the consumed token fails even though it has not expired
        let replay = coordinator.refresh(old_refresh.as_str()).await;
        assert_eq!(replay.unwrap_err(), AuthError::RefreshReplay);

        // The new token keeps working
        assert!(coordinator.refresh(rotated.pair.refresh.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_in_same_second_still_invalidates() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let coordinator = coordinator(db, Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        coordinator.refresh(session.pair.refresh.as_str()).await.unwrap();

        assert_eq!(
            coordinator
                .refresh(session.pair.refresh.as_str())
                .await
                .unwrap_err(),
            AuthError::RefreshReplay
        );
    }

    #[tokio::test]
    async fn test_access_token_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let coordinator = coordinator(db, Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        assert_eq!(
            coordinator
                .refresh(session.pair.access.as_str())
                .await
                .unwrap_err(),
            AuthError::WrongTokenKind
        );
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let clock = Arc::new(ManualClock::starting_now());
        let coordinator = coordinator(db, clock.clone());

        let session = coordinator.start_session(user).await.unwrap();
        clock.set(session.pair.refresh_expires_at);

        assert_eq!(
            coordinator
                .refresh(session.pair.refresh.as_str())
                .await
                .unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_inactive_account() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let user_id = user.id;
        let coordinator = coordinator(db.clone(), Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        db.users()
            .set_status(user_id, crate::db::AccountStatus::Inactive)
            .await
            .unwrap();

        assert_eq!(
            coordinator
                .refresh(session.pair.refresh.as_str())
                .await
                .unwrap_err(),
            AuthError::AccountInactive
        );
    }

    #[tokio::test]
    async fn test_missing_account() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let user_id = user.id;
        let coordinator = coordinator(db.clone(), Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(
            coordinator
                .refresh(session.pair.refresh.as_str())
                .await
                .unwrap_err(),
            AuthError::AccountNotFound
        );
    }

    #[tokio::test]
    async fn test_new_login_revokes_previous_refresh_token() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let coordinator = coordinator(db, Arc::new(ManualClock::starting_now()));

        let first = coordinator.start_session(user.clone()).await.unwrap();
        let _second = coordinator.start_session(user).await.unwrap();

        assert_eq!(
            coordinator
                .refresh(first.pair.refresh.as_str())
                .await
                .unwrap_err(),
            AuthError::RefreshReplay
        );
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_rotation() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let store = SlowStore {
            db: db.clone(),
            rotations: AtomicUsize::new(0),
        };
        let coordinator = coordinator(store, Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        let token = session.pair.refresh.as_str();

        let results =
            futures::future::join_all((0..8).map(|_| coordinator.refresh(token))).await;

        assert_eq!(coordinator.store().rotations.load(Ordering::SeqCst), 1);

        let pairs: Vec<TokenPair> = results.into_iter().map(|r| r.unwrap().pair).collect();
        assert!(pairs.iter().all(|p| *p == pairs[0]));

        // Nothing left in flight, so the consumed token is now a replay
        assert_eq!(
            coordinator.refresh(token).await.unwrap_err(),
            AuthError::RefreshReplay
        );
    }

    #[tokio::test]
    async fn test_cancelled_refreshes_leave_nothing_in_flight() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let coordinator = coordinator(StalledStore { db }, Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        let token = session.pair.refresh.as_str();

        let attempts = (0..3).map(|_| {
            tokio::time::timeout(Duration::from_millis(10), coordinator.refresh(token))
        });
        let results = futures::future::join_all(attempts).await;
        assert!(results.iter().all(|r| r.is_err()));

        assert!(coordinator.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_caller_keeps_shared_rotation() {
        let db = Database::open(":memory:").await.unwrap();
        let user = seed_user(&db, "a@b.com").await;
        let store = SlowStore {
            db: db.clone(),
            rotations: AtomicUsize::new(0),
        };
        let coordinator = coordinator(store, Arc::new(ManualClock::starting_now()));

        let session = coordinator.start_session(user).await.unwrap();
        let token = session.pair.refresh.as_str();

        // One caller gives up while the other is still waiting on the rotation
        let (abandoned, completed) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(10), coordinator.refresh(token)),
            coordinator.refresh(token)
        );
        assert!(abandoned.is_err());
        assert!(completed.is_ok());
        assert_eq!(coordinator.store().rotations.load(Ordering::SeqCst), 1);
        assert!(coordinator.in_flight.lock().unwrap().is_empty());
    }
}
