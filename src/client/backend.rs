//! Pluggable persistence for the client session.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::session::ClientSession;
use crate::clock::{SharedClock, system_clock};
use crate::auth::cookie::{SESSION_COOKIE_NAME, clear_cookie, find_cookie, get_cookie, set_cookie};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode session: {0}")]
    Encode(String),
}

/// Where a [`ClientSession`] lives between calls. Whole-record operations
/// only: a session is saved, loaded or cleared as one unit.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> Result<Option<ClientSession>, BackendError>;
    fn save(&self, session: &ClientSession) -> Result<(), BackendError>;
    fn clear(&self) -> Result<(), BackendError>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<ClientSession>>,
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<Option<ClientSession>, BackendError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, session: &ClientSession) -> Result<(), BackendError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file on disk. Saves write a sibling temp file and rename it into
/// place, so readers see either the old record or the new one.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Write `bytes` to `path`, readable only by the owner on unix.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    // A stale temp file keeps its old mode on open
    #[cfg(unix)]
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<Option<ClientSession>, BackendError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BackendError::Corrupt(e.to_string()))
    }

    fn save(&self, session: &ClientSession) -> Result<(), BackendError> {
        let json =
            serde_json::to_vec_pretty(session).map_err(|e| BackendError::Encode(e.to_string()))?;
        let temp = self.temp_path();
        write_private(&temp, &json)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A single `session` cookie holding the base64url-encoded JSON record.
///
/// Holds the value the browser last sent (or that was last saved); call
/// [`CookieBackend::set_cookie_header`] to emit the matching `Set-Cookie`.
pub struct CookieBackend {
    value: Mutex<Option<String>>,
    secure: bool,
    clock: SharedClock,
}

impl CookieBackend {
    pub fn new(secure: bool) -> Self {
        Self::with_value(None, secure)
    }

    /// Start from a raw `Cookie` header.
    pub fn from_cookie_header(cookie_header: &str, secure: bool) -> Self {
        Self::with_value(
            find_cookie(cookie_header, SESSION_COOKIE_NAME).map(str::to_string),
            secure,
        )
    }

    /// Start from request headers.
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        Self::with_value(
            get_cookie(headers, SESSION_COOKIE_NAME).map(str::to_string),
            secure,
        )
    }

    fn with_value(value: Option<String>, secure: bool) -> Self {
        Self {
            value: Mutex::new(value),
            secure,
            clock: system_clock(),
        }
    }

    /// Clock used to compute the cookie's remaining lifetime.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn encode(session: &ClientSession) -> Result<String, BackendError> {
        let json = serde_json::to_vec(session).map_err(|e| BackendError::Encode(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(value: &str) -> Result<ClientSession, BackendError> {
        let json = URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .map_err(|e| BackendError::Corrupt(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| BackendError::Corrupt(e.to_string()))
    }

    /// `Set-Cookie` value reflecting the current state: the session cookie,
    /// living until the refresh token expires, or a deletion once it has.
    pub fn set_cookie_header(&self) -> Result<String, BackendError> {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let Some(value) = value else {
            return Ok(clear_cookie(SESSION_COOKIE_NAME, self.secure));
        };

        let session = Self::decode(&value)?;
        let max_age = session
            .refresh_token_expires_at
            .saturating_sub(self.clock.now());
        if max_age == 0 {
            return Ok(clear_cookie(SESSION_COOKIE_NAME, self.secure));
        }
        Ok(set_cookie(SESSION_COOKIE_NAME, &value, max_age, self.secure))
    }
}

impl SessionBackend for CookieBackend {
    fn load(&self) -> Result<Option<ClientSession>, BackendError> {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner).clone();
        value.as_deref().map(Self::decode).transpose()
    }

    fn save(&self, session: &ClientSession) -> Result<(), BackendError> {
        let encoded = Self::encode(session)?;
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(encoded);
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
