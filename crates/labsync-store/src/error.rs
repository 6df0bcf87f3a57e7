//! Error types for local persistence and the remote mirror
//!
//! Neither error ever reaches progress or scoring code: local failures are logged
//! at the call site and remote failures are swallowed by the sync worker.

/// Local key-value store failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backing file could not be read or written
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value is not the expected record shape
    #[error("malformed stored record under {key:?}: {source}")]
    Malformed {
        /// Store key holding the record
        key: String,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Remote store failures
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Connection, timeout or body transfer failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("remote returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, empty when unreadable
        message: String,
    },

    /// Response body was not the expected record
    #[error("failed to decode remote response: {0}")]
    Decode(String),

    /// Remote is deliberately offline or unreachable
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// Request could not be built
    #[error("invalid remote configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Check if a retry could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Unavailable(_) => true,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let e = RemoteError::Status {
            status: 503,
            message: "busy".into(),
        };
        assert!(e.is_retryable());
        let e = RemoteError::Status {
            status: 400,
            message: "bad".into(),
        };
        assert!(!e.is_retryable());
        assert!(!RemoteError::Decode("x".into()).is_retryable());
    }
}
