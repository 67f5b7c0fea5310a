use thiserror::Error;

use crate::file::FileStatus;
use crate::types::FileId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    #[error("File {id}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: FileId,
        from: FileStatus,
        to: FileStatus,
    },

    #[error("File not found: {0}")]
    NotFound(FileId),

    #[error("File {0} has no content attached")]
    ContentUnavailable(FileId),
}
