//! # dealroom-shared
//!
//! Domain types shared by the store and client crates: upload files and
//! their metadata, draft snapshots, identifiers, limits and error types.

pub mod constants;
pub mod draft;
pub mod error;
pub mod file;
pub mod types;

pub use draft::{DealFields, DraftPatch, DraftState, FileSummary};
pub use error::FileError;
pub use file::{FileMetadata, FileStatus, MetadataPatch, RawFile, UploadFile};
pub use types::{DraftId, FileId};
