use super::backend::BackendError;

/// Failure of a client-side session operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error body.
    #[error("server rejected request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    /// The request never produced a usable response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no usable session")]
    Unauthenticated,
    #[error(transparent)]
    Storage(#[from] BackendError),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Taxonomy name reported by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Only an unavailable identity store is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Rejected { status: 503, .. })
    }

    /// The server classified the request as definitively failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::Rejected { .. }) && !self.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16, code: &str) -> ClientError {
        ClientError::Rejected {
            status,
            code: code.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn test_classification() {
        let replay = rejected(401, "RefreshReplay");
        assert!(replay.is_terminal());
        assert!(!replay.is_retryable());
        assert_eq!(replay.code(), Some("RefreshReplay"));

        let unavailable = rejected(503, "StoreUnavailable");
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_terminal());

        assert!(!ClientError::Unauthenticated.is_terminal());
        assert_eq!(ClientError::Unauthenticated.code(), None);
    }
}
