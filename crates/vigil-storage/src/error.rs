/// Errors raised by the storage layer.
///
/// Callers on the ingestion path surface every variant as a transient server
/// fault: the agent keeps the sample spooled and retries later.
///
/// # Examples
///
/// ```rust
/// use vigil_storage::error::StorageError;
///
/// let err = StorageError::InvalidValue {
///     column: "desired_state",
///     value: "pause".to_string(),
/// };
/// assert!(err.to_string().contains("desired_state"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating or scanning the data directory failed.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A column held a value the domain types cannot represent.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },

    /// A partition was requested that is neither loaded nor on disk.
    #[error("Storage: partition {0} not found")]
    PartitionNotFound(String),

    /// A blocking storage task could not be joined.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
