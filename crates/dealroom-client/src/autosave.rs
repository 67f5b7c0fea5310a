//! Debounced background saving of the working draft.
//!
//! The worker owns the pending snapshot. Edits are folded into it and a
//! save happens once the user has been quiet for the debounce window, so
//! there is never more than one save in flight. A periodic version check
//! notices writes made by another window and pauses saving until the user
//! picks a side. Once a submission completes the handle is discarded
//! rather than shut down, so pending edits cannot recreate the deleted draft.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use dealroom_shared::{DraftId, DraftPatch, DraftState};
use dealroom_store::StoreError;

use crate::config::ClientConfig;
use crate::drafts::DraftRepository;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AutoSaveStatus {
    Idle,
    /// Unsaved edits are waiting for the debounce window to close.
    Pending,
    #[serde(rename_all = "camelCase")]
    Saved {
        draft_id: DraftId,
        version: u64,
        saved_at: DateTime<Utc>,
    },
    /// The last save failed; it is retried on the next window.
    Failed { message: String, attempts: u32 },
    /// Another writer moved the stored draft ahead of us.
    #[serde(rename_all = "camelCase")]
    Conflict { stored_version: u64 },
    /// Automatic saving is off; explicit flushes still work.
    Disabled { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictChoice {
    /// Overwrite the stored draft with the local state.
    KeepLocal,
    /// Drop local edits and adopt the stored draft.
    ReloadStored,
}

pub enum AutoSaveCommand {
    Changed(DraftPatch),
    Flush(DraftPatch, oneshot::Sender<Result<DraftState>>),
    ResolveConflict(ConflictChoice, oneshot::Sender<Result<Option<DraftState>>>),
    Shutdown,
    Discard,
}

/// Client side of a running auto-save worker.
pub struct AutoSaveHandle {
    tx: mpsc::Sender<AutoSaveCommand>,
    status: watch::Receiver<AutoSaveStatus>,
    task: JoinHandle<()>,
}

impl AutoSaveHandle {
    /// Record an edit. The save happens after the debounce window.
    pub async fn notify_changed(&self, patch: DraftPatch) -> Result<()> {
        self.tx
            .send(AutoSaveCommand::Changed(patch))
            .await
            .map_err(|_| ClientError::AutoSaveStopped)
    }

    /// Save everything pending plus `patch` right now.
    pub async fn flush(&self, patch: DraftPatch) -> Result<DraftState> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AutoSaveCommand::Flush(patch, reply))
            .await
            .map_err(|_| ClientError::AutoSaveStopped)?;
        rx.await.map_err(|_| ClientError::AutoSaveStopped)?
    }

    /// Settle a detected conflict. Returns the draft as it is stored
    /// afterwards, or `None` if there was nothing to settle.
    pub async fn resolve_conflict(&self, choice: ConflictChoice) -> Result<Option<DraftState>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AutoSaveCommand::ResolveConflict(choice, reply))
            .await
            .map_err(|_| ClientError::AutoSaveStopped)?;
        rx.await.map_err(|_| ClientError::AutoSaveStopped)?
    }

    pub fn status(&self) -> AutoSaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoSaveStatus> {
        self.status.clone()
    }

    /// Save what is pending (unless paused) and stop the worker.
    pub async fn shutdown(self) -> Result<()> {
        self.tx
            .send(AutoSaveCommand::Shutdown)
            .await
            .map_err(|_| ClientError::AutoSaveStopped)?;
        self.task.await.map_err(|_| ClientError::AutoSaveStopped)
    }

    /// Drop pending edits and stop without saving. Used once the draft has
    /// been submitted and deleted, so a late edit cannot recreate it.
    pub async fn discard(self) -> Result<()> {
        self.tx
            .send(AutoSaveCommand::Discard)
            .await
            .map_err(|_| ClientError::AutoSaveStopped)?;
        self.task.await.map_err(|_| ClientError::AutoSaveStopped)
    }
}

struct Worker<R> {
    drafts: Arc<R>,
    debounce: Duration,
    max_failures: u32,
    draft_id: Option<DraftId>,
    known_version: u64,
    pending: Option<DraftPatch>,
    deadline: Option<Instant>,
    failures: u32,
    disabled: bool,
    conflict: Option<u64>,
    status: watch::Sender<AutoSaveStatus>,
}

/// Spawn the auto-save worker.
///
/// `existing` is the draft being edited when resuming a recovered draft;
/// `None` starts a new one on the first save.
pub fn spawn_autosave<R>(
    drafts: Arc<R>,
    config: &ClientConfig,
    existing: Option<&DraftState>,
) -> AutoSaveHandle
where
    R: DraftRepository + 'static,
{
    let (tx, mut rx) = mpsc::channel::<AutoSaveCommand>(256);
    let (status_tx, status_rx) = watch::channel(AutoSaveStatus::Idle);

    let mut worker = Worker {
        drafts,
        debounce: config.autosave_debounce,
        max_failures: config.autosave_max_failures.max(1),
        draft_id: existing.map(|d| d.id.clone()),
        known_version: existing.map_or(0, |d| d.version),
        pending: None,
        deadline: None,
        failures: 0,
        disabled: false,
        conflict: None,
        status: status_tx,
    };
    let check_every = config.conflict_check_interval;

    let task = tokio::spawn(async move {
        let mut conflict_check = time::interval_at(Instant::now() + check_every, check_every);
        conflict_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = worker.deadline;
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(AutoSaveCommand::Changed(patch)) => worker.on_changed(patch),
                        Some(AutoSaveCommand::Flush(patch, reply)) => {
                            let _ = reply.send(worker.on_flush(patch));
                        }
                        Some(AutoSaveCommand::ResolveConflict(choice, reply)) => {
                            let _ = reply.send(worker.on_resolve(choice));
                        }
                        Some(AutoSaveCommand::Discard) => {
                            worker.on_discard();
                            break;
                        }
                        Some(AutoSaveCommand::Shutdown) => {
                            info!("auto-save shutdown requested");
                            worker.on_shutdown();
                            break;
                        }
                        None => {
                            debug!("auto-save handle dropped, stopping worker");
                            worker.on_shutdown();
                            break;
                        }
                    }
                }

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    worker.deadline = None;
                    worker.on_window_closed();
                }

                _ = conflict_check.tick() => {
                    worker.check_conflict();
                }
            }
        }
    });

    AutoSaveHandle {
        tx,
        status: status_rx,
        task,
    }
}

impl<R: DraftRepository> Worker<R> {
    fn publish(&self, status: AutoSaveStatus) {
        self.status.send_replace(status);
    }

    fn on_changed(&mut self, patch: DraftPatch) {
        self.merge_pending(patch);
        if self.disabled || self.conflict.is_some() {
            return;
        }
        self.deadline = Some(Instant::now() + self.debounce);
        self.publish(AutoSaveStatus::Pending);
    }

    fn on_window_closed(&mut self) {
        if self.disabled || self.conflict.is_some() || self.pending.is_none() {
            return;
        }
        // re-check right before writing so a stale snapshot never lands
        if self.check_conflict() {
            return;
        }
        if let Err(e) = self.save_pending() {
            self.record_failure(&e);
        }
    }

    fn on_flush(&mut self, patch: DraftPatch) -> Result<DraftState> {
        // the edit is kept even when the write has to wait for a resolution
        self.merge_pending(patch);
        self.deadline = None;
        if self.check_conflict() {
            let stored_version = self.conflict.unwrap_or(self.known_version);
            return Err(ClientError::Conflict { stored_version });
        }
        match self.save_pending() {
            Ok(saved) => Ok(saved),
            Err(e) => {
                warn!(error = %e, "manual draft save failed");
                if !self.disabled {
                    self.record_failure(&e);
                }
                Err(e.into())
            }
        }
    }

    fn on_resolve(&mut self, choice: ConflictChoice) -> Result<Option<DraftState>> {
        let Some(stored_version) = self.conflict else {
            return Ok(None);
        };
        let Some(id) = self.draft_id.clone() else {
            self.conflict = None;
            return Ok(None);
        };

        match choice {
            ConflictChoice::KeepLocal => {
                info!(draft_id = %id, stored_version, "conflict resolved, keeping local edits");
                self.known_version = stored_version;
                self.conflict = None;
                if self.pending.is_none() {
                    self.publish(AutoSaveStatus::Idle);
                    return Ok(None);
                }
                let saved = self.save_pending()?;
                Ok(Some(saved))
            }
            ConflictChoice::ReloadStored => {
                let stored = self.drafts.load(&id)?;
                info!(draft_id = %id, version = stored.version, "conflict resolved, reloading stored draft");
                self.pending = None;
                self.deadline = None;
                self.known_version = stored.version;
                self.conflict = None;
                self.publish(AutoSaveStatus::Saved {
                    draft_id: stored.id.clone(),
                    version: stored.version,
                    saved_at: stored.saved_at,
                });
                Ok(Some(stored))
            }
        }
    }

    fn on_shutdown(&mut self) {
        if self.disabled || self.conflict.is_some() || self.pending.is_none() {
            return;
        }
        if let Some(ref id) = self.draft_id {
            if let Err(StoreError::NotFound(_)) = self.drafts.load(id) {
                info!(draft_id = %id, "draft deleted elsewhere, dropping pending edits");
                return;
            }
        }
        if let Err(e) = self.save_pending() {
            warn!(error = %e, "could not save pending draft on shutdown");
        }
    }

    fn on_discard(&mut self) {
        info!(
            draft_id = ?self.draft_id,
            had_pending = self.pending.is_some(),
            "auto-save discarded"
        );
        self.pending = None;
        self.deadline = None;
        self.publish(AutoSaveStatus::Idle);
    }

    /// Returns true when a conflict is (now) active.
    fn check_conflict(&mut self) -> bool {
        if self.conflict.is_some() {
            return true;
        }
        let Some(id) = self.draft_id.clone() else {
            return false;
        };

        let stored_version = match self.drafts.check_conflict(&id, self.known_version) {
            Ok(false) => return false,
            Ok(true) => match self.drafts.load(&id) {
                Ok(stored) => stored.version,
                Err(e) => {
                    warn!(draft_id = %id, error = %e, "could not read conflicting draft");
                    return false;
                }
            },
            Err(e) => {
                warn!(draft_id = %id, error = %e, "conflict check failed");
                if e.is_unavailable() {
                    self.disable(e.to_string());
                }
                return false;
            }
        };

        warn!(draft_id = %id, known = self.known_version, stored_version, "draft changed in another window");
        self.conflict = Some(stored_version);
        self.deadline = None;
        self.publish(AutoSaveStatus::Conflict { stored_version });
        true
    }

    fn merge_pending(&mut self, patch: DraftPatch) {
        match self.pending {
            Some(ref mut pending) => pending.merge(patch),
            None => self.pending = Some(patch),
        }
    }

    fn save_pending(&mut self) -> std::result::Result<DraftState, StoreError> {
        let mut patch = self.pending.clone().unwrap_or_default();
        if let Some(ref id) = self.draft_id {
            patch.id = Some(id.clone());
        }

        let saved = self.drafts.save(&patch)?;
        debug!(draft_id = %saved.id, version = saved.version, "draft saved");

        self.draft_id = Some(saved.id.clone());
        self.known_version = saved.version;
        self.pending = None;
        self.failures = 0;
        if !self.disabled {
            self.publish(AutoSaveStatus::Saved {
                draft_id: saved.id.clone(),
                version: saved.version,
                saved_at: saved.saved_at,
            });
        }
        Ok(saved)
    }

    fn record_failure(&mut self, e: &StoreError) {
        self.failures += 1;
        warn!(error = %e, attempts = self.failures, "auto-save failed");

        if e.is_unavailable() {
            self.disable(format!("Draft storage unavailable: {e}"));
        } else if self.failures >= self.max_failures {
            self.disable(format!("Auto-save failed {} times in a row: {e}", self.failures));
        } else {
            self.deadline = Some(Instant::now() + self.debounce);
            self.publish(AutoSaveStatus::Failed {
                message: e.to_string(),
                attempts: self.failures,
            });
        }
    }

    fn disable(&mut self, reason: String) {
        warn!(reason = %reason, "auto-save disabled");
        self.disabled = true;
        self.deadline = None;
        self.publish(AutoSaveStatus::Disabled { reason });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::drafts::testing::MemoryDrafts;

    fn config() -> ClientConfig {
        ClientConfig {
            autosave_debounce: Duration::from_secs(2),
            conflict_check_interval: Duration::from_secs(30),
            autosave_max_failures: 3,
            ..Default::default()
        }
    }

    fn named(name: &str) -> DraftPatch {
        DraftPatch {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn described(description: &str) -> DraftPatch {
        DraftPatch {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    async fn advance(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_is_saved_once_after_quiet_period() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        advance(1_000).await;
        handle.notify_changed(described("Seed round")).await.unwrap();
        advance(1_500).await;
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 0);
        assert_eq!(handle.status(), AutoSaveStatus::Pending);

        advance(1_000).await;
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);

        let AutoSaveStatus::Saved { draft_id, version, .. } = handle.status() else {
            panic!("expected saved, got {:?}", handle.status());
        };
        assert_eq!(version, 1);
        let stored = drafts.stored(&draft_id).unwrap();
        assert_eq!(stored.fields.name.as_deref(), Some("Acme"));
        assert_eq!(stored.fields.description.as_deref(), Some("Seed round"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_saves_reuse_the_same_draft() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        advance(2_500).await;
        handle.notify_changed(named("Acme Corp")).await.unwrap();
        advance(2_500).await;

        assert_eq!(drafts.list_all().unwrap().len(), 1);
        assert!(matches!(handle.status(), AutoSaveStatus::Saved { version: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_saves_immediately_and_clears_pending() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        let saved = handle.flush(DraftPatch::default().with_section("files")).await.unwrap();

        assert_eq!(saved.fields.name.as_deref(), Some("Acme"));
        assert_eq!(saved.active_section.as_deref(), Some("files"));

        advance(5_000).await;
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried_on_next_window() {
        let drafts = Arc::new(MemoryDrafts::default());
        drafts.fail_saves.store(1, Ordering::SeqCst);
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        advance(2_500).await;
        assert!(matches!(
            handle.status(),
            AutoSaveStatus::Failed { attempts: 1, .. }
        ));

        advance(2_000).await;
        assert!(matches!(handle.status(), AutoSaveStatus::Saved { .. }));
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_disable_autosave_but_not_flush() {
        let drafts = Arc::new(MemoryDrafts::default());
        drafts.fail_saves.store(3, Ordering::SeqCst);
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        advance(10_000).await;
        assert!(matches!(handle.status(), AutoSaveStatus::Disabled { .. }));

        handle.notify_changed(described("still typing")).await.unwrap();
        advance(10_000).await;
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 0);

        let saved = handle.flush(DraftPatch::default()).await.unwrap();
        assert_eq!(saved.fields.name.as_deref(), Some("Acme"));
        assert_eq!(saved.fields.description.as_deref(), Some("still typing"));
        assert!(matches!(handle.status(), AutoSaveStatus::Disabled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_disables_immediately() {
        let drafts = Arc::new(MemoryDrafts::default());
        drafts.unavailable.store(true, Ordering::SeqCst);
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        advance(2_500).await;

        let AutoSaveStatus::Disabled { reason } = handle.status() else {
            panic!("expected disabled, got {:?}", handle.status());
        };
        assert!(reason.contains("unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_pauses_saving_until_resolved() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        let saved = handle.flush(named("Acme")).await.unwrap();
        let external = drafts.external_write(&saved.id);

        advance(31_000).await;
        assert_eq!(
            handle.status(),
            AutoSaveStatus::Conflict {
                stored_version: external.version
            }
        );

        handle.notify_changed(named("Acme local")).await.unwrap();
        advance(5_000).await;
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
        assert!(matches!(
            handle.flush(DraftPatch::default()).await,
            Err(ClientError::Conflict { .. })
        ));

        let kept = handle
            .resolve_conflict(ConflictChoice::KeepLocal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.fields.name.as_deref(), Some("Acme local"));
        assert!(kept.version > external.version);
        assert!(matches!(handle.status(), AutoSaveStatus::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_external_write_reports_conflict() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        let saved = handle.flush(named("Acme")).await.unwrap();
        let external = drafts.external_write(&saved.id);

        let err = handle.flush(described("mine")).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Conflict { stored_version } if stored_version == external.version
        ));
        assert_eq!(
            handle.status(),
            AutoSaveStatus::Conflict {
                stored_version: external.version
            }
        );
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
        assert_eq!(drafts.stored(&saved.id).unwrap(), external);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_during_conflict_is_kept_for_keep_local() {
        let drafts = Arc::new(MemoryDrafts::default());
        let existing = drafts.save(&named("Acme")).unwrap();
        let handle = spawn_autosave(drafts.clone(), &config(), Some(&existing));

        drafts.external_write(&existing.id);
        advance(31_000).await;
        assert!(matches!(handle.status(), AutoSaveStatus::Conflict { .. }));

        assert!(matches!(
            handle.flush(DraftPatch::default().with_section("financials")).await,
            Err(ClientError::Conflict { .. })
        ));

        let kept = handle
            .resolve_conflict(ConflictChoice::KeepLocal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.active_section.as_deref(), Some("financials"));
        assert_eq!(
            drafts.stored(&existing.id).unwrap().active_section.as_deref(),
            Some("financials")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_stored_discards_local_edits() {
        let drafts = Arc::new(MemoryDrafts::default());
        let existing = drafts.save(&named("Acme")).unwrap();
        let handle = spawn_autosave(drafts.clone(), &config(), Some(&existing));

        drafts.external_write(&existing.id);
        handle.notify_changed(named("Local only")).await.unwrap();
        advance(2_500).await;
        assert!(matches!(handle.status(), AutoSaveStatus::Conflict { .. }));

        let stored = handle
            .resolve_conflict(ConflictChoice::ReloadStored)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields.name.as_deref(), Some("Acme"));
        assert_eq!(stored.fields.description.as_deref(), Some("edited elsewhere"));

        advance(5_000).await;
        assert_eq!(drafts.stored(&existing.id).unwrap(), stored);
        assert!(handle
            .resolve_conflict(ConflictChoice::KeepLocal)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_pending_edits() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        handle.notify_changed(named("Acme")).await.unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_after_delete_does_not_recreate_draft() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        let saved = handle.flush(named("Acme")).await.unwrap();
        handle.notify_changed(described("late edit")).await.unwrap();
        assert!(drafts.delete(&saved.id).unwrap());

        handle.discard().await.unwrap();

        assert!(drafts.list_all().unwrap().is_empty());
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_does_not_recreate_deleted_draft() {
        let drafts = Arc::new(MemoryDrafts::default());
        let handle = spawn_autosave(drafts.clone(), &config(), None);

        let saved = handle.flush(named("Acme")).await.unwrap();
        handle.notify_changed(described("late edit")).await.unwrap();
        drafts.delete(&saved.id).unwrap();

        handle.shutdown().await.unwrap();

        assert!(drafts.list_all().unwrap().is_empty());
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
    }
}
