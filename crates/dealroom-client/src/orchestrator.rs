//! Multi-file submission.
//!
//! ```text
//! Idle -> CreatingDraft -> Uploading(i of N) -> Finalizing -> Completed
//!              |                 |                  |
//!              +-----------------+------------------+--> Failed | Cancelled
//! ```
//!
//! Files go up one at a time in list order. A failed file is recorded and
//! the loop carries on with the next one; finalize only runs when every
//! file made it. Whenever the run stops short, the backend draft and the
//! local draft are left alone so the user can retry without retyping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use dealroom_shared::{DealFields, DraftId, FileError, FileId, FileStatus};

use crate::backend::{BackendError, DraftBackend, ProgressFn};
use crate::drafts::DraftRepository;
use crate::events::{emit_event, EventSender, SubmissionEvent};
use crate::files::FileList;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SubmissionState {
    Idle,
    CreatingDraft,
    /// `current` is 1-based.
    Uploading { current: usize, total: usize },
    Finalizing,
    #[serde(rename_all = "camelCase")]
    Completed { deal_id: String },
    Failed { failure: SubmissionFailure },
    Cancelled,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Completed { .. }
                | SubmissionState::Failed { .. }
                | SubmissionState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file_id: FileId,
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum SubmissionFailure {
    #[serde(rename_all = "camelCase")]
    Draft {
        message: String,
        field_errors: BTreeMap<String, String>,
    },
    Files { errors: Vec<FileFailure> },
    Finalize { message: String },
}

impl SubmissionFailure {
    fn draft(err: &BackendError) -> Self {
        SubmissionFailure::Draft {
            message: err.to_string(),
            field_errors: err.field_errors().cloned().unwrap_or_default(),
        }
    }
}

/// Stops the upload loop before its next file. An upload already in
/// flight is allowed to settle.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SubmissionRequest<'a> {
    pub fields: &'a DealFields,
    pub files: &'a mut FileList,
    /// Backend draft from an earlier attempt; updated instead of recreated.
    pub remote_draft_id: Option<DraftId>,
    /// Local draft to delete once the deal is finalized.
    pub local_draft_id: Option<DraftId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    pub state: SubmissionState,
    /// Pass back in on retry.
    pub remote_draft_id: Option<DraftId>,
    pub overall_progress: u8,
}

pub struct SubmissionOrchestrator<B, R> {
    backend: Arc<B>,
    drafts: Arc<R>,
    events: Option<EventSender>,
    cancel: CancelHandle,
    state: SubmissionState,
}

impl<B, R> SubmissionOrchestrator<B, R>
where
    B: DraftBackend + 'static,
    R: DraftRepository + 'static,
{
    pub fn new(backend: Arc<B>, drafts: Arc<R>) -> Self {
        Self {
            backend,
            drafts,
            events: None,
            cancel: CancelHandle::default(),
            state: SubmissionState::Idle,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Run one submission attempt to a terminal state.
    ///
    /// Files that failed in an earlier attempt are reset and tried again;
    /// files already completed are not re-sent.
    pub async fn submit(&mut self, request: SubmissionRequest<'_>) -> SubmissionReport {
        let SubmissionRequest {
            fields,
            files,
            remote_draft_id,
            local_draft_id,
        } = request;

        if let SubmissionState::Completed { .. } = self.state {
            warn!("submission already completed, ignoring");
            return self.report(remote_draft_id, files);
        }

        self.cancel.reset();
        let retried = files.reset_failed();
        if retried > 0 {
            info!(retried, "retrying previously failed files");
        }

        // -- creating-draft --
        self.set_state(SubmissionState::CreatingDraft);
        let saved = match remote_draft_id {
            Some(ref id) => self.backend.update(id, fields).await,
            None => self.backend.create(fields).await,
        };
        let draft_id = match saved {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "could not save backend draft");
                self.set_state(SubmissionState::Failed {
                    failure: SubmissionFailure::draft(&e),
                });
                return self.report(remote_draft_id, files);
            }
        };

        // -- uploading --
        let total = files.len();
        let mut errors = Vec::new();
        self.emit_overall(files);

        for index in 0..total {
            if self.cancel.is_cancelled() {
                info!(draft_id = %draft_id, next = index + 1, total, "upload cancelled");
                self.set_state(SubmissionState::Cancelled);
                return self.report(Some(draft_id), files);
            }

            let Some(file) = files.get_index_mut(index) else {
                break;
            };
            if file.status == FileStatus::Completed {
                continue;
            }

            self.state = SubmissionState::Uploading {
                current: index + 1,
                total,
            };
            self.emit(SubmissionEvent::StateChanged {
                state: self.state.clone(),
            });

            let reported = Arc::new(AtomicU8::new(0));
            let outcome = if file.content.is_none() {
                Err(FileError::ContentUnavailable(file.id).to_string())
            } else if let Err(e) = file.start_upload() {
                Err(e.to_string())
            } else {
                let metadata = file.metadata.clone().unwrap_or_default();
                let progress = self.progress_fn(index, file.id, &file.name, reported.clone());
                let result = self
                    .backend
                    .upload_file(&draft_id, file, &metadata, progress)
                    .await
                    .map_err(|e| e.to_string());
                file.set_progress(reported.load(Ordering::SeqCst));
                result
            };

            match outcome {
                Ok(()) => {
                    file.set_progress(100);
                    if let Err(e) = file.complete() {
                        warn!(error = %e, "unexpected file state after upload");
                    }
                    info!(file_name = %file.name, current = index + 1, total, "file uploaded");
                }
                Err(message) => {
                    warn!(file_name = %file.name, error = %message, "file upload failed");
                    if let Err(e) = file.fail(message.clone()) {
                        warn!(error = %e, "unexpected file state after failed upload");
                    }
                    errors.push(FileFailure {
                        file_id: file.id,
                        file_name: file.name.clone(),
                        message,
                    });
                }
            }
            self.emit_overall(files);
        }

        if !errors.is_empty() {
            warn!(draft_id = %draft_id, failed = errors.len(), total, "submission stopped before finalize");
            self.set_state(SubmissionState::Failed {
                failure: SubmissionFailure::Files { errors },
            });
            return self.report(Some(draft_id), files);
        }

        // -- finalizing --
        self.set_state(SubmissionState::Finalizing);
        match self.backend.finalize(&draft_id).await {
            Ok(deal_id) => {
                if let Some(ref local) = local_draft_id {
                    if let Err(e) = self.drafts.delete(local) {
                        warn!(draft_id = %local, error = %e, "could not delete local draft");
                    }
                }
                info!(draft_id = %draft_id, deal_id = %deal_id, "submission completed");
                self.set_state(SubmissionState::Completed { deal_id });
            }
            Err(e) => {
                warn!(draft_id = %draft_id, error = %e, "finalize failed");
                self.set_state(SubmissionState::Failed {
                    failure: SubmissionFailure::Finalize {
                        message: e.to_string(),
                    },
                });
            }
        }
        self.report(Some(draft_id), files)
    }

    /// Forwards backend progress as events and keeps the latest percent in
    /// `reported` so the file record can be updated once the upload returns.
    fn progress_fn(
        &self,
        index: usize,
        file_id: FileId,
        file_name: &str,
        reported: Arc<AtomicU8>,
    ) -> ProgressFn {
        let events = self.events.clone();
        let file_name = file_name.to_string();
        Arc::new(move |percent| {
            let percent = percent.min(100);
            reported.fetch_max(percent, Ordering::SeqCst);
            if let Some(ref tx) = events {
                emit_event(
                    tx,
                    SubmissionEvent::FileProgress {
                        index,
                        file_id,
                        file_name: file_name.clone(),
                        percent,
                    },
                );
            }
        })
    }

    fn set_state(&mut self, state: SubmissionState) {
        tracing::debug!(state = ?state, "submission state");
        self.state = state;
        self.emit(SubmissionEvent::StateChanged {
            state: self.state.clone(),
        });
    }

    fn emit(&self, event: SubmissionEvent) {
        if let Some(ref tx) = self.events {
            emit_event(tx, event);
        }
    }

    fn emit_overall(&self, files: &FileList) {
        self.emit(SubmissionEvent::OverallProgress {
            percent: overall_progress(files),
        });
    }

    fn report(&self, remote_draft_id: Option<DraftId>, files: &FileList) -> SubmissionReport {
        SubmissionReport {
            state: self.state.clone(),
            remote_draft_id,
            overall_progress: overall_progress(files),
        }
    }
}

/// Completed files over all files, as a whole percentage.
pub fn overall_progress(files: &FileList) -> u8 {
    if files.is_empty() {
        return 100;
    }
    (files.count_with_status(FileStatus::Completed) * 100 / files.len()) as u8
}
