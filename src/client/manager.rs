//! Client-side session coordinator.
//!
//! Owns a [`SessionStore`] and an [`AuthApi`], and drives the session through
//! `Fresh -> NeedsRefresh -> Refreshing -> Fresh | Unauthenticated`.
//! At most one refresh is on the wire per manager: callers that arrive while
//! one is in flight wait for it and pick up its outcome from the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::SessionBackend;
use super::error::ClientError;
use super::http::AuthApi;
use super::session::{ClientSession, Freshness, SessionStore};
use crate::api::dto::{LoginRequest, RegisterRequest, VerifyResponse};

/// Default time `wait_for_session` waits before giving up.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    NeedsRefresh,
    Refreshing,
    Unauthenticated,
}

/// Backoff for refreshes rejected with a retryable error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given (zero-based) failed attempt: exponential, capped,
    /// with full jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }
}

struct RefreshingFlag<'a>(&'a AtomicBool);

impl<'a> RefreshingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SessionManager<A, B> {
    api: A,
    store: SessionStore<B>,
    retry: RetryPolicy,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
}

impl<A: AuthApi, B: SessionBackend> SessionManager<A, B> {
    pub fn new(api: A, store: SessionStore<B>) -> Self {
        Self {
            api,
            store,
            retry: RetryPolicy::default(),
            refresh_lock: Mutex::new(()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &SessionStore<B> {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        if self.refreshing.load(Ordering::SeqCst) {
            return SessionState::Refreshing;
        }
        match self.store.freshness() {
            Freshness::Fresh => SessionState::Fresh,
            Freshness::Stale => SessionState::NeedsRefresh,
            Freshness::Missing | Freshness::RefreshExpired => SessionState::Unauthenticated,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<ClientSession, ClientError> {
        let response = self
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        let session = ClientSession::from(response);
        self.store.set(session.clone())?;
        info!(subject = %session.user.id, "Logged in");
        Ok(session)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<ClientSession, ClientError> {
        let session = ClientSession::from(self.api.register(request).await?);
        self.store.set(session.clone())?;
        info!(subject = %session.user.id, "Registered");
        Ok(session)
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// Concurrent calls share one network rotation. A terminal rejection
    /// deletes the stored session.
    pub async fn refresh(&self) -> Result<ClientSession, ClientError> {
        let snapshot = self.store.get().ok_or(ClientError::Unauthenticated)?;

        let _guard = self.refresh_lock.lock().await;

        // Someone else finished a refresh (or a logout) while we waited
        match self.store.get() {
            None => return Err(ClientError::Unauthenticated),
            Some(current) if current.refresh_token != snapshot.refresh_token => {
                debug!("Refresh already completed by a concurrent caller");
                return Ok(current);
            }
            Some(_) => {}
        }

        if self.store.is_refresh_token_expired() {
            info!("Refresh token expired, clearing session");
            self.store.clear()?;
            return Err(ClientError::Unauthenticated);
        }

        let result = {
            let _flag = RefreshingFlag::raise(&self.refreshing);
            self.api.refresh(&snapshot.refresh_token).await
        };

        match result {
            Ok(response) => {
                let session = ClientSession::from(response);
                self.store.set(session.clone())?;
                debug!(subject = %session.user.id, "Session refreshed");
                Ok(session)
            }
            Err(e) if e.is_terminal() => {
                warn!(error = %e, "Refresh rejected, clearing session");
                self.store.clear()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Return an access token that is outside the refresh buffer,
    /// refreshing first if needed. Retryable rejections are retried per the
    /// [`RetryPolicy`].
    pub async fn ensure_fresh(&self) -> Result<String, ClientError> {
        match self.store.freshness() {
            Freshness::Fresh => {
                return self.store.access_token().ok_or(ClientError::Unauthenticated);
            }
            Freshness::Missing => return Err(ClientError::Unauthenticated),
            Freshness::RefreshExpired => {
                self.store.clear()?;
                return Err(ClientError::Unauthenticated);
            }
            Freshness::Stale => {}
        }

        let mut attempt = 0;
        loop {
            match self.refresh().await {
                Ok(session) => return Ok(session.access_token),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Refresh failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ask the server whether the current session is still good.
    pub async fn verify(&self) -> Result<VerifyResponse, ClientError> {
        let token = self.ensure_fresh().await?;
        self.api.verify(&token).await
    }

    /// Revoke the session server-side (best effort) and delete it locally.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(session) = self.store.get() {
            if let Err(e) = self.api.logout(&session.access_token).await {
                warn!(error = %e, "Server logout failed");
            }
        }
        self.store.clear()?;
        Ok(())
    }

    /// Wait until a session appears in the backend, polling every 50 ms.
    /// Each poll reloads from the backend, so sessions saved by another
    /// process sharing it are adopted too. `None` waits
    /// [`DEFAULT_WAIT_TIMEOUT`]. Returns whether one appeared.
    pub async fn wait_for_session(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let poll = async {
            loop {
                match self.store.reload() {
                    Ok(Some(_)) => return,
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Session backend not readable yet"),
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}
