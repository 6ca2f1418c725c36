//! Client side of the session lifecycle: persisted session state, freshness
//! queries and coordinated refresh against the auth endpoints.

mod backend;
mod error;
mod http;
mod manager;
mod session;
pub mod timestamp;

pub use backend::{BackendError, CookieBackend, FileBackend, MemoryBackend, SessionBackend};
pub use error::ClientError;
pub use http::{AuthApi, HttpAuthApi};
pub use manager::{DEFAULT_WAIT_TIMEOUT, RetryPolicy, SessionManager, SessionState};
pub use session::{ClientSession, Freshness, REFRESH_BUFFER_SECS, SessionStore, SessionUser};
