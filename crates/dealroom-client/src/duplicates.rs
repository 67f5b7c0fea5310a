//! Duplicate resolution queue.
//!
//! Every incoming file that collides by `(name, size)` with a file already
//! in the list becomes a [`DuplicateCandidate`]. Candidates are presented one
//! at a time, strictly in enqueue order, and each needs exactly one decision:
//! replace the existing file, keep both under a new name, or cancel.
//!
//! After a decision the next candidate is held back for `advance_delay` so
//! the prompt can transition; [`DuplicateQueue::wait_for_next`] waits that
//! out. A decision that fails leaves the candidate presented and unresolved.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use dealroom_shared::{FileError, FileId, RawFile, UploadFile};

use crate::files::FileList;

/// An incoming file paired with the existing file it collides with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCandidate {
    pub incoming: RawFile,
    /// Snapshot of the existing entry at detection time.
    pub existing: UploadFile,
}

impl DuplicateCandidate {
    pub fn new(incoming: RawFile, existing: UploadFile) -> Self {
        Self { incoming, existing }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Replace,
    KeepBoth { name: String },
    Cancel,
}

/// A candidate together with the decision taken on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCandidate {
    pub candidate: DuplicateCandidate,
    pub resolution: Resolution,
    /// Id of the file added to the list, if any.
    pub added: Option<FileId>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No duplicate is awaiting a decision")]
    NothingPresented,

    #[error("New name must not be blank")]
    BlankName,

    #[error("New name must differ from the original name")]
    SameAsOriginal,

    #[error("A file named \"{0}\" already exists")]
    NameTaken(String),

    #[error("Too many files (max {max})")]
    TooManyFiles { max: usize },

    #[error(transparent)]
    File(#[from] FileError),
}

#[derive(Debug)]
pub struct DuplicateQueue {
    queue: VecDeque<DuplicateCandidate>,
    /// Whether the front of `queue` is currently shown to the user.
    presenting: bool,
    advance_at: Option<Instant>,
    advance_delay: Duration,
    max_files: usize,
}

impl DuplicateQueue {
    pub fn new(advance_delay: Duration, max_files: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            presenting: false,
            advance_at: None,
            advance_delay,
            max_files,
        }
    }

    /// Append candidates. Presents the first one right away unless another
    /// is already shown or a transition delay is still running.
    pub fn enqueue(&mut self, candidates: impl IntoIterator<Item = DuplicateCandidate>) {
        let before = self.queue.len();
        self.queue.extend(candidates);
        let added = self.queue.len() - before;
        if added > 0 {
            debug!(added, queued = self.queue.len(), "duplicates enqueued");
        }
        self.present_if_due();
    }

    /// The candidate awaiting a decision, if one is shown.
    pub fn current(&self) -> Option<&DuplicateCandidate> {
        if self.presenting {
            self.queue.front()
        } else {
            None
        }
    }

    /// Show the next candidate once its transition delay has passed,
    /// without waiting. Returns the shown candidate, if any.
    pub fn present_if_due(&mut self) -> Option<&DuplicateCandidate> {
        if !self.presenting && !self.queue.is_empty() {
            let due = self.advance_at.map_or(true, |at| Instant::now() >= at);
            if due {
                self.presenting = true;
                self.advance_at = None;
            }
        }
        self.current()
    }

    /// Wait out the transition delay and return the next candidate.
    /// Returns `None` once the queue is drained.
    pub async fn wait_for_next(&mut self) -> Option<&DuplicateCandidate> {
        if self.presenting || self.queue.is_empty() {
            return self.current();
        }
        if let Some(at) = self.advance_at {
            tokio::time::sleep_until(at).await;
        }
        self.present_if_due()
    }

    /// Candidates not yet resolved, the shown one included.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop the existing file and add the incoming one under its own name.
    pub fn resolve_replace(
        &mut self,
        files: &mut FileList,
    ) -> Result<ResolvedCandidate, ResolutionError> {
        let candidate = self.presented()?;

        files.remove(candidate.existing.id)?;
        let file = UploadFile::from_raw(candidate.incoming.clone());
        let added = file.id;
        files.push(file);

        self.advance(Resolution::Replace, Some(added))
    }

    /// Add the incoming file next to the existing one under `new_name`.
    pub fn resolve_keep_both(
        &mut self,
        files: &mut FileList,
        new_name: &str,
    ) -> Result<ResolvedCandidate, ResolutionError> {
        let candidate = self.presented()?;
        let name = new_name.trim();

        if name.is_empty() {
            return Err(ResolutionError::BlankName);
        }
        if name == candidate.incoming.name {
            return Err(ResolutionError::SameAsOriginal);
        }
        if files.contains_name(name) {
            return Err(ResolutionError::NameTaken(name.to_string()));
        }
        if files.len() >= self.max_files {
            return Err(ResolutionError::TooManyFiles {
                max: self.max_files,
            });
        }

        let file = UploadFile::from_raw(candidate.incoming.renamed(name));
        let added = file.id;
        files.push(file);

        self.advance(
            Resolution::KeepBoth {
                name: name.to_string(),
            },
            Some(added),
        )
    }

    /// Discard the incoming file.
    pub fn resolve_cancel(&mut self) -> Result<ResolvedCandidate, ResolutionError> {
        self.presented()?;
        self.advance(Resolution::Cancel, None)
    }

    fn presented(&self) -> Result<&DuplicateCandidate, ResolutionError> {
        self.current().ok_or(ResolutionError::NothingPresented)
    }

    fn advance(
        &mut self,
        resolution: Resolution,
        added: Option<FileId>,
    ) -> Result<ResolvedCandidate, ResolutionError> {
        let candidate = self
            .queue
            .pop_front()
            .ok_or(ResolutionError::NothingPresented)?;
        self.presenting = false;

        info!(
            file_name = %candidate.incoming.name,
            resolution = ?resolution,
            remaining = self.queue.len(),
            "duplicate resolved"
        );

        self.advance_at = if self.queue.is_empty() {
            None
        } else {
            Some(Instant::now() + self.advance_delay)
        };
        if self.advance_delay.is_zero() {
            self.present_if_due();
        }

        Ok(ResolvedCandidate {
            candidate,
            resolution,
            added,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn raw(name: &str, len: usize) -> RawFile {
        RawFile::new(name, "application/pdf", Bytes::from(vec![3u8; len]))
    }

    /// A list holding `names` (each 10 bytes) and one candidate per name.
    fn setup(names: &[&str]) -> (FileList, Vec<DuplicateCandidate>) {
        let mut files = FileList::new();
        let mut candidates = Vec::new();
        for name in names {
            let existing = UploadFile::from_raw(raw(name, 10));
            candidates.push(DuplicateCandidate::new(raw(name, 10), existing.clone()));
            files.push(existing);
        }
        (files, candidates)
    }

    fn names(files: &FileList) -> Vec<String> {
        files.iter().map(|f| f.name.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidates_resolve_in_fifo_order_after_delay() {
        let (mut files, candidates) = setup(&["a.pdf", "b.pdf", "c.pdf"]);
        let mut queue = DuplicateQueue::new(Duration::from_millis(300), 10);
        queue.enqueue(candidates);

        assert_eq!(queue.current().unwrap().incoming.name, "a.pdf");
        queue.resolve_cancel().unwrap();

        // next one is held back during the transition
        assert!(queue.current().is_none());
        assert_eq!(queue.resolve_cancel(), Err(ResolutionError::NothingPresented));

        let start = Instant::now();
        assert_eq!(queue.wait_for_next().await.unwrap().incoming.name, "b.pdf");
        assert!(start.elapsed() >= Duration::from_millis(300));
        queue.resolve_replace(&mut files).unwrap();

        assert_eq!(queue.wait_for_next().await.unwrap().incoming.name, "c.pdf");
        queue.resolve_keep_both(&mut files, "c (1).pdf").unwrap();

        assert!(queue.is_empty());
        assert!(queue.wait_for_next().await.is_none());
    }

    #[test]
    fn test_n_candidates_need_n_resolutions() {
        let (_, candidates) = setup(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
        let mut queue = DuplicateQueue::new(Duration::ZERO, 10);
        queue.enqueue(candidates);

        let mut resolved = Vec::new();
        while !queue.is_empty() {
            resolved.push(queue.resolve_cancel().unwrap().candidate.incoming.name);
        }
        assert_eq!(resolved, vec!["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
    }

    #[test]
    fn test_replace_swaps_existing_for_fresh_pending_file() {
        let (mut files, candidates) = setup(&["a.pdf"]);
        let old_id = candidates[0].existing.id;
        let mut queue = DuplicateQueue::new(Duration::ZERO, 10);
        queue.enqueue(candidates);

        let resolved = queue.resolve_replace(&mut files).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files.get(old_id).is_none());
        let added = files.get(resolved.added.unwrap()).unwrap();
        assert_eq!(added.name, "a.pdf");
        assert_eq!(added.status, dealroom_shared::FileStatus::Pending);
    }

    #[test]
    fn test_keep_both_rejects_bad_names_and_stays_unresolved() {
        let (mut files, candidates) = setup(&["a.pdf", "other.pdf"]);
        let mut queue = DuplicateQueue::new(Duration::ZERO, 10);
        queue.enqueue(candidates.into_iter().take(1));

        assert_eq!(
            queue.resolve_keep_both(&mut files, "   "),
            Err(ResolutionError::BlankName)
        );
        assert_eq!(
            queue.resolve_keep_both(&mut files, "a.pdf"),
            Err(ResolutionError::SameAsOriginal)
        );
        assert_eq!(
            queue.resolve_keep_both(&mut files, "other.pdf"),
            Err(ResolutionError::NameTaken("other.pdf".into()))
        );

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current().unwrap().incoming.name, "a.pdf");
        assert_eq!(files.len(), 2);

        let resolved = queue.resolve_keep_both(&mut files, " a-v2.pdf ").unwrap();
        assert_eq!(
            resolved.resolution,
            Resolution::KeepBoth {
                name: "a-v2.pdf".into()
            }
        );
        assert_eq!(names(&files), vec!["a.pdf", "other.pdf", "a-v2.pdf"]);
        let added = files.get(resolved.added.unwrap()).unwrap();
        assert_eq!(added.size, 10);
        assert_eq!(added.mime_type, "application/pdf");
    }

    #[test]
    fn test_keep_both_respects_file_limit() {
        let (mut files, candidates) = setup(&["a.pdf", "b.pdf"]);
        let mut queue = DuplicateQueue::new(Duration::ZERO, 2);
        queue.enqueue(candidates);

        assert_eq!(
            queue.resolve_keep_both(&mut files, "a2.pdf"),
            Err(ResolutionError::TooManyFiles { max: 2 })
        );
        // replace does not grow the list
        assert!(queue.resolve_replace(&mut files).is_ok());
    }

    #[test]
    fn test_replace_fails_when_existing_file_is_gone() {
        let (mut files, candidates) = setup(&["a.pdf"]);
        let existing_id = candidates[0].existing.id;
        let mut queue = DuplicateQueue::new(Duration::ZERO, 10);
        queue.enqueue(candidates);
        files.remove(existing_id).unwrap();

        let err = queue.resolve_replace(&mut files).unwrap_err();

        assert_eq!(err, ResolutionError::File(FileError::NotFound(existing_id)));
        assert_eq!(queue.len(), 1);
        assert!(queue.current().is_some());
        assert!(files.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_transition_waits_for_delay() {
        let (_, candidates) = setup(&["a.pdf", "b.pdf"]);
        let mut iter = candidates.into_iter();
        let mut queue = DuplicateQueue::new(Duration::from_millis(300), 10);

        queue.enqueue(iter.next());
        queue.enqueue(iter.next());
        queue.resolve_cancel().unwrap();
        assert!(queue.current().is_none());

        tokio::time::advance(Duration::from_millis(301)).await;
        assert_eq!(queue.present_if_due().unwrap().incoming.name, "b.pdf");
    }
}
