//! Batch validation for newly selected files.
//!
//! [`validate_batch`] is a pure partition: it never touches the file list.
//! The caller merges `accepted` into the list and hands `duplicates` to the
//! [`DuplicateQueue`](crate::duplicates::DuplicateQueue).

use serde::Serialize;

use dealroom_shared::constants::{DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE};
use dealroom_shared::{RawFile, UploadFile};

use crate::duplicates::DuplicateCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
    /// Compare batch members against each other as well as against the
    /// existing list. Off by default.
    pub dedupe_within_batch: bool,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            dedupe_within_batch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RejectReason {
    EmptyName,
    TooLarge { size: u64, max: u64 },
    TooManyFiles { max: usize },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyName => write!(f, "File name is empty"),
            RejectReason::TooLarge { size, max } => {
                write!(f, "File too large: {size} bytes (max {max})")
            }
            RejectReason::TooManyFiles { max } => write!(f, "Too many files (max {max})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub file: RawFile,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct BatchPartition {
    pub accepted: Vec<UploadFile>,
    pub duplicates: Vec<DuplicateCandidate>,
    pub rejected: Vec<RejectedFile>,
}

impl BatchPartition {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.duplicates.len() + self.rejected.len()
    }
}

/// Split `batch` into accepted, duplicate and rejected files.
///
/// Files are checked in input order: name, then size, then `(name, size)`
/// collision with a non-error file of `existing` (first match wins), then
/// the file count. The count includes files accepted earlier in the same
/// batch; duplicates do not count since resolving one never grows the list
/// beyond a keep-both rename, which is re-checked at resolution time.
pub fn validate_batch(
    existing: &[UploadFile],
    batch: Vec<RawFile>,
    limits: &UploadLimits,
) -> BatchPartition {
    let mut partition = BatchPartition::default();

    for raw in batch {
        if raw.name.trim().is_empty() {
            partition.rejected.push(RejectedFile {
                file: raw,
                reason: RejectReason::EmptyName,
            });
            continue;
        }

        if raw.size > limits.max_file_size {
            let reason = RejectReason::TooLarge {
                size: raw.size,
                max: limits.max_file_size,
            };
            partition.rejected.push(RejectedFile { file: raw, reason });
            continue;
        }

        let collision = existing
            .iter()
            .find(|f| f.collides_with(&raw.name, raw.size))
            .or_else(|| {
                limits
                    .dedupe_within_batch
                    .then(|| {
                        partition
                            .accepted
                            .iter()
                            .find(|f| f.collides_with(&raw.name, raw.size))
                    })
                    .flatten()
            })
            .cloned();

        if let Some(existing_file) = collision {
            partition
                .duplicates
                .push(DuplicateCandidate::new(raw, existing_file));
            continue;
        }

        if existing.len() + partition.accepted.len() >= limits.max_files {
            partition.rejected.push(RejectedFile {
                file: raw,
                reason: RejectReason::TooManyFiles {
                    max: limits.max_files,
                },
            });
            continue;
        }

        partition.accepted.push(UploadFile::from_raw(raw));
    }

    tracing::debug!(
        accepted = partition.accepted.len(),
        duplicates = partition.duplicates.len(),
        rejected = partition.rejected.len(),
        "validated file batch"
    );

    partition
}
