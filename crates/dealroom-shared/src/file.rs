//! Upload file model.
//!
//! An [`UploadFile`] is one user-selected document in the active file list.
//! Its status only ever moves forward (`Pending -> Uploading -> Completed |
//! Error`); the single backwards edge is [`UploadFile::reset_for_retry`],
//! used when a failed submission is attempted again.

use std::collections::BTreeSet;

use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FileError;
use crate::types::FileId;

// ---------------------------------------------------------------------------
// Raw file
// ---------------------------------------------------------------------------

/// A file as handed over by the picker / drop zone, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub content: Bytes,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            name: name.into(),
            size: content.len() as u64,
            mime_type: mime_type.into(),
            content,
        }
    }

    /// Same bytes and type under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Descriptive metadata attached to a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub category: Option<String>,
    pub document_type: Option<String>,
    #[serde(default)]
    pub proprietary: bool,
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub publish_date: Option<NaiveDate>,
}

/// Partial metadata edit. `None` leaves the field untouched; `tags`
/// replaces the whole tag set when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proprietary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<NaiveDate>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl FileMetadata {
    pub fn apply(&mut self, patch: &MetadataPatch) {
        if let Some(ref category) = patch.category {
            self.category = Some(category.clone());
        }
        if let Some(ref document_type) = patch.document_type {
            self.document_type = Some(document_type.clone());
        }
        if let Some(proprietary) = patch.proprietary {
            self.proprietary = proprietary;
        }
        if let Some(ref summary) = patch.summary {
            self.summary = Some(summary.clone());
        }
        if let Some(ref tags) = patch.tags {
            // blank tags are dropped, the rest trimmed
            self.tags = tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(date) = patch.publish_date {
            self.publish_date = Some(date);
        }
    }
}

// ---------------------------------------------------------------------------
// Upload file
// ---------------------------------------------------------------------------

/// One file in the active list, with its transient upload state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadFile {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: FileStatus,
    /// Transfer progress, 0-100.
    pub progress: u8,
    pub error: Option<String>,
    pub metadata: Option<FileMetadata>,
    /// Raw bytes. Absent for files restored from a saved draft.
    #[serde(skip)]
    pub content: Option<Bytes>,
}

impl UploadFile {
    pub fn from_raw(raw: RawFile) -> Self {
        Self {
            id: FileId::new(),
            name: raw.name,
            size: raw.size,
            mime_type: raw.mime_type,
            status: FileStatus::Pending,
            progress: 0,
            error: None,
            metadata: None,
            content: Some(raw.content),
        }
    }

    /// Whether this file claims the `(name, size)` slot in its list.
    /// Failed files never count as duplicates.
    pub fn collides_with(&self, name: &str, size: u64) -> bool {
        self.status != FileStatus::Error && self.name == name && self.size == size
    }

    pub fn start_upload(&mut self) -> Result<(), FileError> {
        self.transition(FileStatus::Pending, FileStatus::Uploading)?;
        self.progress = 0;
        Ok(())
    }

    /// Record transport progress. Ignored unless uploading; never goes back.
    pub fn set_progress(&mut self, percent: u8) {
        if self.status == FileStatus::Uploading {
            self.progress = self.progress.max(percent.min(100));
        }
    }

    pub fn complete(&mut self) -> Result<(), FileError> {
        self.transition(FileStatus::Uploading, FileStatus::Completed)?;
        self.progress = 100;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), FileError> {
        match self.status {
            FileStatus::Pending | FileStatus::Uploading => {
                self.status = FileStatus::Error;
                self.error = Some(message.into());
                Ok(())
            }
            from => Err(FileError::InvalidTransition {
                id: self.id,
                from,
                to: FileStatus::Error,
            }),
        }
    }

    /// Put a failed file back in the queue for another submission attempt.
    pub fn reset_for_retry(&mut self) -> Result<(), FileError> {
        self.transition(FileStatus::Error, FileStatus::Pending)?;
        self.progress = 0;
        self.error = None;
        Ok(())
    }

    pub fn metadata_mut(&mut self) -> &mut FileMetadata {
        self.metadata.get_or_insert_with(FileMetadata::default)
    }

    fn transition(&mut self, from: FileStatus, to: FileStatus) -> Result<(), FileError> {
        if self.status != from {
            return Err(FileError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, len: usize) -> UploadFile {
        UploadFile::from_raw(RawFile::new(
            name,
            "application/pdf",
            Bytes::from(vec![0u8; len]),
        ))
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut file = pdf("a.pdf", 4);
        assert!(file.complete().is_err());

        file.start_upload().unwrap();
        file.set_progress(40);
        file.set_progress(20);
        assert_eq!(file.progress, 40);

        file.complete().unwrap();
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.progress, 100);

        assert!(file.start_upload().is_err());
        assert!(file.fail("late").is_err());
    }

    #[test]
    fn test_failed_file_can_be_reset_for_retry() {
        let mut file = pdf("a.pdf", 4);
        file.start_upload().unwrap();
        file.fail("connection reset").unwrap();
        assert_eq!(file.error.as_deref(), Some("connection reset"));

        file.reset_for_retry().unwrap();
        assert_eq!(file.status, FileStatus::Pending);
        assert!(file.error.is_none());
    }

    #[test]
    fn test_error_files_do_not_collide() {
        let mut file = pdf("a.pdf", 4);
        assert!(file.collides_with("a.pdf", 4));
        assert!(!file.collides_with("a.pdf", 5));

        file.fail("rejected by server").unwrap();
        assert!(!file.collides_with("a.pdf", 4));
    }

    #[test]
    fn test_metadata_patch_only_touches_given_fields() {
        let mut meta = FileMetadata {
            category: Some("Financials".into()),
            summary: Some("Q3 numbers".into()),
            ..Default::default()
        };

        meta.apply(&MetadataPatch {
            proprietary: Some(true),
            tags: Some(["  audit ".to_string(), "".to_string()].into_iter().collect()),
            ..Default::default()
        });

        assert_eq!(meta.category.as_deref(), Some("Financials"));
        assert_eq!(meta.summary.as_deref(), Some("Q3 numbers"));
        assert!(meta.proprietary);
        assert_eq!(meta.tags.iter().collect::<Vec<_>>(), vec!["audit"]);
    }
}
