use std::path::PathBuf;

/// Failure of a network call to the collector or control service.
///
/// # Examples
///
/// ```rust
/// use vigil_agent::error::TransportError;
///
/// let err = TransportError::from_status(503, "storage unavailable".into());
/// assert!(err.is_transient());
/// let err = TransportError::from_status(422, "cpu out of range".into());
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Timeouts, connection failures and retryable server statuses. The
    /// sample stays spooled and is retried on a later tick.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The collector refused the payload itself. Retrying the same bytes
    /// can never succeed.
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl TransportError {
    /// Maps a non-success HTTP status to a failure class: malformed or
    /// out-of-range payloads are terminal, everything else is retried.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 413 | 422 => TransportError::Rejected { status, message },
            _ => TransportError::Transient(format!("status {status}: {message}")),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Transient(e.to_string())
    }
}

/// Fatal local storage failure.
///
/// Without a working spool the agent can no longer guarantee delivery, so
/// this error stops the run loop instead of dropping samples.
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("spool I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("spool entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("spool is full ({0} entries)")]
    Full(usize),
}

impl SpoolError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        SpoolError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
