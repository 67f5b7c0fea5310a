//! Draft persistence as seen by the client.
//!
//! [`DraftRepository`] is the seam the auto-saver and the orchestrator talk
//! to; [`LocalDraftStore`] implements it over the SQLite [`Database`].

use std::sync::{Arc, Mutex, MutexGuard};

use dealroom_shared::{DraftId, DraftPatch, DraftState};
use dealroom_store::{Database, StoreError};

use crate::config::ClientConfig;

pub trait DraftRepository: Send + Sync {
    /// Merge, bump the version, stamp the time; create when absent.
    fn save(&self, patch: &DraftPatch) -> Result<DraftState, StoreError>;

    /// The stored draft, or [`StoreError::NotFound`].
    fn load(&self, id: &DraftId) -> Result<DraftState, StoreError>;

    /// Idempotent. Returns whether something was deleted.
    fn delete(&self, id: &DraftId) -> Result<bool, StoreError>;

    /// All drafts, most recently saved first.
    fn list_all(&self) -> Result<Vec<DraftState>, StoreError>;

    /// True iff the stored version is newer than `known_version`.
    fn check_conflict(&self, id: &DraftId, known_version: u64) -> Result<bool, StoreError>;
}

/// Shared handle to the on-disk draft database.
#[derive(Clone)]
pub struct LocalDraftStore {
    db: Arc<Mutex<Database>>,
}

impl LocalDraftStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open the database named by the config (or the platform default).
    pub fn open(config: &ClientConfig) -> Result<Self, StoreError> {
        let db = match config.data_dir {
            Some(ref dir) => Database::open_in_dir(dir)?,
            None => Database::new()?,
        };
        Ok(Self::new(db))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }
}

impl DraftRepository for LocalDraftStore {
    fn save(&self, patch: &DraftPatch) -> Result<DraftState, StoreError> {
        self.lock()?.save_draft(patch)
    }

    fn load(&self, id: &DraftId) -> Result<DraftState, StoreError> {
        self.lock()?.load_draft(id)
    }

    fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
        self.lock()?.delete_draft(id)
    }

    fn list_all(&self) -> Result<Vec<DraftState>, StoreError> {
        self.lock()?.list_drafts()
    }

    fn check_conflict(&self, id: &DraftId, known_version: u64) -> Result<bool, StoreError> {
        self.lock()?.check_conflict(id, known_version)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory repository with switchable failure modes.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    pub struct MemoryDrafts {
        drafts: Mutex<HashMap<DraftId, DraftState>>,
        pub saves: AtomicUsize,
        /// Next N saves fail with an I/O error.
        pub fail_saves: AtomicUsize,
        pub unavailable: std::sync::atomic::AtomicBool,
    }

    impl MemoryDrafts {
        /// Simulate a write from another window.
        pub fn external_write(&self, id: &DraftId) -> DraftState {
            let mut drafts = self.drafts.lock().unwrap();
            let draft = drafts
                .entry(id.clone())
                .or_insert_with(|| DraftState::empty(id.clone(), Utc::now()));
            draft.version += 1;
            draft.fields.description = Some("edited elsewhere".into());
            draft.clone()
        }

        pub fn stored(&self, id: &DraftId) -> Option<DraftState> {
            self.drafts.lock().unwrap().get(id).cloned()
        }
    }

    impl DraftRepository for MemoryDrafts {
        fn save(&self, patch: &DraftPatch) -> Result<DraftState, StoreError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk gone".into()));
            }
            if self
                .fail_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Io(std::io::Error::other("quota exceeded")));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);

            let id = patch.id.clone().unwrap_or_else(DraftId::new_local);
            let mut drafts = self.drafts.lock().unwrap();
            let draft = drafts
                .entry(id.clone())
                .or_insert_with(|| DraftState::empty(id, Utc::now()));
            draft.apply(patch);
            draft.version += 1;
            draft.saved_at = Utc::now();
            Ok(draft.clone())
        }

        fn load(&self, id: &DraftId) -> Result<DraftState, StoreError> {
            self.stored(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        }

        fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
            Ok(self.drafts.lock().unwrap().remove(id).is_some())
        }

        fn list_all(&self) -> Result<Vec<DraftState>, StoreError> {
            let mut all: Vec<_> = self.drafts.lock().unwrap().values().cloned().collect();
            all.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
            Ok(all)
        }

        fn check_conflict(&self, id: &DraftId, known_version: u64) -> Result<bool, StoreError> {
            Ok(self.stored(id).is_some_and(|d| d.version > known_version))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_store_delegates_to_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let store = LocalDraftStore::open(&config).unwrap();

        let saved = store
            .save(&DraftPatch {
                name: Some("Acme".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.load(&saved.id).unwrap(), saved);
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert!(!store.check_conflict(&saved.id, saved.version).unwrap());

        // a second handle on the same file acts as another window
        let other = LocalDraftStore::open(&config).unwrap();
        other.save(&DraftPatch::for_draft(saved.id.clone())).unwrap();
        assert!(store.check_conflict(&saved.id, saved.version).unwrap());

        assert!(store.delete(&saved.id).unwrap());
        assert!(matches!(store.load(&saved.id), Err(StoreError::NotFound(_))));
    }
}
