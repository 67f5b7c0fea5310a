//! Contracts of the remote collaborators.
//!
//! [`DraftBackend`] covers the deal-draft lifecycle (create / update /
//! upload / finalize) and [`FileBackend`] the library of already uploaded
//! files. [`HttpBackend`](crate::http::HttpBackend) implements both over
//! REST; tests use in-memory mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dealroom_shared::{DealFields, DraftId, FileMetadata, MetadataPatch, UploadFile};

/// Receives transfer progress (0-100) for the file being uploaded.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Field-level validation messages, keyed by field name.
    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    General(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    pub fn general(message: impl Into<String>) -> Self {
        BackendError::General(message.into())
    }

    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            BackendError::Validation(fields) => Some(fields),
            _ => None,
        }
    }
}

fn format_field_errors(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Create a backend draft from the form fields; returns its id.
    async fn create(&self, fields: &DealFields) -> BackendResult<DraftId>;

    async fn update(&self, id: &DraftId, fields: &DealFields) -> BackendResult<DraftId>;

    /// Upload one file into the draft, reporting progress through `progress`.
    async fn upload_file(
        &self,
        draft_id: &DraftId,
        file: &UploadFile,
        metadata: &FileMetadata,
        progress: ProgressFn,
    ) -> BackendResult<()>;

    /// Turn the draft into a permanent deal; returns the final deal id.
    async fn finalize(&self, id: &DraftId) -> BackendResult<String>;
}

/// Processing state of a file on the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFileStatus {
    Processing,
    Ready,
    Failed,
}

/// A file already stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: RemoteFileStatus,
    /// Deal (or library scope) the file belongs to.
    pub scope_id: Option<String>,
    #[serde(default)]
    pub metadata: FileMetadata,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait FileBackend: Send + Sync {
    /// Files in `scope_id`, or the whole library when `None`.
    async fn list(&self, scope_id: Option<&str>) -> BackendResult<Vec<RemoteFile>>;

    async fn update(&self, file_id: &str, patch: &MetadataPatch) -> BackendResult<()>;

    async fn delete(&self, file_id: &str) -> BackendResult<()>;

    async fn reprocess(&self, file_id: &str) -> BackendResult<()>;

    async fn bulk_delete(&self, file_ids: &[String]) -> BackendResult<()>;

    async fn bulk_update(&self, file_ids: &[String], patch: &MetadataPatch) -> BackendResult<()>;

    async fn bulk_reprocess(&self, file_ids: &[String]) -> BackendResult<()>;

    async fn download(&self, file_id: &str) -> BackendResult<Bytes>;
}
