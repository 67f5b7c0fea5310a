/// Application name
pub const APP_NAME: &str = "Dealroom";

/// Default maximum number of files attached to one submission
pub const DEFAULT_MAX_FILES: usize = 20;

/// Default maximum size of a single file in bytes (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Quiet period before a burst of edits is written to the draft store
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 2_000;

/// How often an open draft is compared against the stored version
pub const CONFLICT_CHECK_INTERVAL_SECS: u64 = 30;

/// Pause between resolving one duplicate and presenting the next
pub const DUPLICATE_ADVANCE_DELAY_MS: u64 = 300;

/// Consecutive auto-save failures before auto-save is switched off
pub const AUTOSAVE_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Prefix of draft ids generated on this device (server ids never carry it)
pub const LOCAL_DRAFT_PREFIX: &str = "local-";

/// Chunk size used when streaming a file body to the backend (64 KiB)
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Default REST endpoint of the deal backend
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
