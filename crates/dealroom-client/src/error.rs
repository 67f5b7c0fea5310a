use thiserror::Error;

use dealroom_shared::FileError;
use dealroom_store::StoreError;

use crate::backend::BackendError;
use crate::duplicates::ResolutionError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Draft store error: {0}")]
    Store(#[from] StoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Duplicate resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Draft was changed elsewhere (stored version {stored_version})")]
    Conflict { stored_version: u64 },

    #[error("Auto-save worker is not running")]
    AutoSaveStopped,
}

pub type Result<T> = std::result::Result<T, ClientError>;
