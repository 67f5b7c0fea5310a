use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No draft stored under the requested id.
    #[error("Draft not found: {0}")]
    NotFound(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The file list column could not be (de)serialized.
    #[error("Draft encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store cannot be used at all (closed, poisoned, unreadable).
    #[error("Draft store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying later is pointless.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::NoDataDir)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
