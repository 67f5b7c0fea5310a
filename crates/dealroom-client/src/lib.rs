//! # dealroom-client
//!
//! Client-side engine of the deal submission flow: batch validation and
//! duplicate resolution for dropped files, debounced draft auto-save with
//! cross-window conflict detection, the sequential multi-file submission
//! orchestrator, and the file library table.

pub mod autosave;
pub mod backend;
pub mod config;
pub mod drafts;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod files;
pub mod http;
pub mod library;
pub mod orchestrator;
pub mod session;
pub mod validator;

use tracing_subscriber::{fmt, EnvFilter};

pub use autosave::{spawn_autosave, AutoSaveHandle, AutoSaveStatus, ConflictChoice};
pub use backend::{BackendError, DraftBackend, FileBackend, RemoteFile};
pub use config::ClientConfig;
pub use drafts::{DraftRepository, LocalDraftStore};
pub use duplicates::{DuplicateCandidate, DuplicateQueue, Resolution, ResolutionError};
pub use error::{ClientError, Result};
pub use events::{event_channel, SubmissionEvent};
pub use files::FileList;
pub use http::HttpBackend;
pub use library::{FileLibrary, SortColumn, SortDirection};
pub use orchestrator::{
    CancelHandle, SubmissionOrchestrator, SubmissionReport, SubmissionRequest, SubmissionState,
};
pub use session::{AddFilesOutcome, UploadSession};
pub use validator::{validate_batch, BatchPartition, RejectReason, UploadLimits};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dealroom_client=debug,dealroom_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
