//! One editing session of a deal submission: the active file list, its
//! duplicate queue and the limits that govern both.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use dealroom_shared::{
    DealFields, DraftId, DraftPatch, DraftState, FileError, FileId, MetadataPatch, RawFile,
    UploadFile,
};
use dealroom_store::StoreError;

use crate::config::ClientConfig;
use crate::drafts::DraftRepository;
use crate::duplicates::{DuplicateCandidate, DuplicateQueue, ResolutionError, ResolvedCandidate};
use crate::files::FileList;
use crate::validator::{validate_batch, RejectedFile, UploadLimits};

/// What happened to a dropped batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddFilesOutcome {
    /// Ids of files appended to the list, in batch order.
    pub accepted: Vec<FileId>,
    /// Candidates handed to the duplicate queue.
    pub duplicates: usize,
    pub rejected: Vec<RejectedFile>,
}

/// Counts shown next to the file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub files: usize,
    pub max_files: usize,
    pub pending_duplicates: usize,
}

#[derive(Debug)]
pub struct UploadSession {
    files: FileList,
    duplicates: DuplicateQueue,
    limits: UploadLimits,
    draft_id: Option<DraftId>,
}

impl UploadSession {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_limits(config.upload_limits(), config.duplicate_advance_delay)
    }

    pub fn with_limits(limits: UploadLimits, duplicate_delay: Duration) -> Self {
        Self {
            files: FileList::new(),
            duplicates: DuplicateQueue::new(duplicate_delay, limits.max_files),
            limits,
            draft_id: None,
        }
    }

    /// Resume from a saved draft. Restored files carry no content and must
    /// be attached again before they can be uploaded.
    pub fn restore(config: &ClientConfig, draft: &DraftState) -> Self {
        let mut session = Self::new(config);
        session.files = FileList::from_summaries(&draft.files);
        session.draft_id = Some(draft.id.clone());
        info!(draft_id = %draft.id, files = draft.files.len(), "session restored from draft");
        session
    }

    /// The most recently saved draft, if any, for an offer to resume.
    pub fn find_recoverable<R: DraftRepository + ?Sized>(
        drafts: &R,
    ) -> Result<Option<DraftState>, StoreError> {
        Ok(drafts.list_all()?.into_iter().next())
    }

    pub fn files(&self) -> &FileList {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileList {
        &mut self.files
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn draft_id(&self) -> Option<&DraftId> {
        self.draft_id.as_ref()
    }

    /// Remember which local draft this session writes to.
    pub fn set_draft_id(&mut self, id: DraftId) {
        self.draft_id = Some(id);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            files: self.files.len(),
            max_files: self.limits.max_files,
            pending_duplicates: self.duplicates.len(),
        }
    }

    /// Validate a batch, append what is accepted and queue the duplicates.
    pub fn add_files(&mut self, batch: Vec<RawFile>) -> AddFilesOutcome {
        let partition = validate_batch(self.files.as_slice(), batch, &self.limits);

        let accepted = partition.accepted.iter().map(|f| f.id).collect();
        let duplicates = partition.duplicates.len();
        self.files.extend(partition.accepted);
        self.duplicates.enqueue(partition.duplicates);

        AddFilesOutcome {
            accepted,
            duplicates,
            rejected: partition.rejected,
        }
    }

    pub fn remove_file(&mut self, id: FileId) -> Result<UploadFile, FileError> {
        self.files.remove(id)
    }

    pub fn update_metadata(&mut self, id: FileId, patch: &MetadataPatch) -> Result<(), FileError> {
        self.files.update_metadata(id, patch)
    }

    pub fn bulk_update_metadata(&mut self, ids: &[FileId], patch: &MetadataPatch) -> usize {
        self.files.bulk_update_metadata(ids, patch)
    }

    pub fn current_duplicate(&self) -> Option<&DuplicateCandidate> {
        self.duplicates.current()
    }

    pub async fn next_duplicate(&mut self) -> Option<&DuplicateCandidate> {
        self.duplicates.wait_for_next().await
    }

    pub fn resolve_replace(&mut self) -> Result<ResolvedCandidate, ResolutionError> {
        self.duplicates.resolve_replace(&mut self.files)
    }

    pub fn resolve_keep_both(&mut self, new_name: &str) -> Result<ResolvedCandidate, ResolutionError> {
        self.duplicates.resolve_keep_both(&mut self.files, new_name)
    }

    pub fn resolve_cancel(&mut self) -> Result<ResolvedCandidate, ResolutionError> {
        self.duplicates.resolve_cancel()
    }

    /// Snapshot for the draft store: form fields, current section and the
    /// summary of every file.
    pub fn draft_patch(&self, fields: &DealFields, section: Option<&str>) -> DraftPatch {
        let mut patch = match self.draft_id {
            Some(ref id) => DraftPatch::for_draft(id.clone()),
            None => DraftPatch::default(),
        }
        .with_fields(fields)
        .with_files(self.files.summaries());
        if let Some(section) = section {
            patch = patch.with_section(section);
        }
        patch
    }
}
