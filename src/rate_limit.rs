//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::{ErrorBody, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key used when the client address cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Quotas for the limited endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Sustained login attempts per second per IP
    pub login_per_second: u32,
    /// Login attempts allowed in a burst
    pub login_burst: u32,
    /// Registrations per minute per IP
    pub register_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_second: 1,
            login_burst: 5,
            register_per_minute: 3,
        }
    }
}

impl RateLimitSettings {
    /// Quotas high enough that tests never hit them.
    pub fn relaxed() -> Self {
        Self {
            login_per_second: 1000,
            login_burst: 1000,
            register_per_minute: 1000,
        }
    }
}

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    pub register: Arc<IpLimiter>,
    /// Key on `X-Forwarded-For` instead of the socket address
    pub trust_proxy: bool,
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, trust_proxy: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(non_zero(settings.login_per_second))
                    .allow_burst(non_zero(settings.login_burst)),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.register_per_minute,
            )))),
            trust_proxy,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_proxy).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

fn too_many_requests(message: &str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            error: "RateLimited",
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            too_many_requests("Too many login attempts. Please wait before trying again.")
        }
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Registration rate limit exceeded");
            too_many_requests("Too many signup attempts. Please wait before trying again.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let config = RateLimitConfig::new(
            RateLimitSettings {
                login_per_second: 1,
                login_burst: 2,
                register_per_minute: 1,
            },
            false,
        );
        let key = "198.51.100.4".to_string();

        assert!(config.login.check_key(&key).is_ok());
        assert!(config.login.check_key(&key).is_ok());
        assert!(config.login.check_key(&key).is_err());

        // Other clients have their own bucket
        assert!(config.login.check_key(&"198.51.100.5".to_string()).is_ok());

        assert!(config.register.check_key(&key).is_ok());
        assert!(config.register.check_key(&key).is_err());
    }

    #[test]
    fn test_zero_quota_is_clamped() {
        let config = RateLimitConfig::new(
            RateLimitSettings {
                login_per_second: 0,
                login_burst: 0,
                register_per_minute: 0,
            },
            false,
        );
        assert!(config.login.check_key(&"a".to_string()).is_ok());
    }
}
