//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client works with zero
//! configuration against a local backend.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dealroom_shared::constants::{
    AUTOSAVE_DEBOUNCE_MS, AUTOSAVE_MAX_CONSECUTIVE_FAILURES, CONFLICT_CHECK_INTERVAL_SECS,
    DEFAULT_API_URL, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE, DUPLICATE_ADVANCE_DELAY_MS,
};

use crate::validator::UploadLimits;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the deal backend REST API.
    /// Env: `DEALROOM_API_URL`
    /// Default: `http://localhost:8000/api`
    pub api_base_url: String,

    /// Maximum number of files per submission.
    /// Env: `DEALROOM_MAX_FILES`
    pub max_files: usize,

    /// Maximum size of one file in bytes.
    /// Env: `DEALROOM_MAX_FILE_SIZE`
    pub max_file_size: u64,

    /// Also treat identical files inside one dropped batch as duplicates.
    /// Env: `DEALROOM_DEDUPE_WITHIN_BATCH` (true/false)
    /// Default: `false`
    pub dedupe_within_batch: bool,

    /// Quiet period before edits are auto-saved.
    /// Env: `DEALROOM_AUTOSAVE_MS`
    pub autosave_debounce: Duration,

    /// Interval between cross-window conflict checks.
    /// Env: `DEALROOM_CONFLICT_CHECK_SECS`
    pub conflict_check_interval: Duration,

    /// Pause between two duplicate prompts.
    /// Env: `DEALROOM_DUPLICATE_DELAY_MS`
    pub duplicate_advance_delay: Duration,

    /// Failed auto-saves in a row before auto-save turns itself off.
    pub autosave_max_failures: u32,

    /// Directory holding `drafts.db`. `None` uses the platform data dir.
    /// Env: `DEALROOM_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            dedupe_within_batch: false,
            autosave_debounce: Duration::from_millis(AUTOSAVE_DEBOUNCE_MS),
            conflict_check_interval: Duration::from_secs(CONFLICT_CHECK_INTERVAL_SECS),
            duplicate_advance_delay: Duration::from_millis(DUPLICATE_ADVANCE_DELAY_MS),
            autosave_max_failures: AUTOSAVE_MAX_CONSECUTIVE_FAILURES,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DEALROOM_API_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                tracing::warn!("Empty DEALROOM_API_URL, using default");
            } else {
                config.api_base_url = url.to_string();
            }
        }

        if let Some(n) = parse_var(&lookup, "DEALROOM_MAX_FILES") {
            config.max_files = n;
        }

        if let Some(n) = parse_var(&lookup, "DEALROOM_MAX_FILE_SIZE") {
            config.max_file_size = n;
        }

        if let Some(val) = lookup("DEALROOM_DEDUPE_WITHIN_BATCH") {
            config.dedupe_within_batch = val == "true" || val == "1";
        }

        if let Some(ms) = parse_var(&lookup, "DEALROOM_AUTOSAVE_MS") {
            config.autosave_debounce = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var(&lookup, "DEALROOM_CONFLICT_CHECK_SECS") {
            config.conflict_check_interval = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_var(&lookup, "DEALROOM_DUPLICATE_DELAY_MS") {
            config.duplicate_advance_delay = Duration::from_millis(ms);
        }

        if let Some(dir) = lookup("DEALROOM_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            dedupe_within_batch: self.dedupe_within_batch,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
