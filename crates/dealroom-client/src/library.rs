//! Table view over files already stored by the backend.
//!
//! Rows are a local mirror of the last [`FileLibrary::refresh`]. Mutations
//! go to the backend first; the mirror only changes once the backend call
//! has succeeded, so a failed request never leaves the table lying.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dealroom_shared::MetadataPatch;

use crate::backend::{BackendError, BackendResult, FileBackend, RemoteFile, RemoteFileStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    Name,
    Size,
    Category,
    Status,
    UploadedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Filter {
    /// Lowercased search text.
    query: String,
    category: Option<String>,
}

impl Filter {
    fn matches(&self, file: &RemoteFile) -> bool {
        if let Some(ref category) = self.category {
            if file.metadata.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.query.is_empty() {
            return true;
        }
        let q = self.query.as_str();
        file.name.to_lowercase().contains(q)
            || file
                .metadata
                .summary
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(q))
            || file.metadata.tags.iter().any(|t| t.to_lowercase().contains(q))
    }
}

pub struct FileLibrary<B> {
    backend: Arc<B>,
    scope: Option<String>,
    files: Vec<RemoteFile>,
    sort: (SortColumn, SortDirection),
    filter: Filter,
    selected: BTreeSet<String>,
}

impl<B: FileBackend> FileLibrary<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            scope: None,
            files: Vec::new(),
            sort: (SortColumn::UploadedAt, SortDirection::Desc),
            filter: Filter::default(),
            selected: BTreeSet::new(),
        }
    }

    /// Reload the rows of `scope` (or the whole library). Selected ids that
    /// disappeared are dropped from the selection.
    pub async fn refresh(&mut self, scope: Option<&str>) -> BackendResult<usize> {
        let files = self.backend.list(scope).await?;
        self.scope = scope.map(str::to_string);
        self.files = files;
        let present: BTreeSet<&str> = self.files.iter().map(|f| f.id.as_str()).collect();
        self.selected.retain(|id| present.contains(id.as_str()));
        debug!(count = self.files.len(), scope = ?self.scope, "library refreshed");
        Ok(self.files.len())
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RemoteFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Visible rows: filtered, then sorted. Ties keep refresh order.
    pub fn rows(&self) -> Vec<&RemoteFile> {
        let mut rows: Vec<&RemoteFile> = self.files.iter().filter(|f| self.filter.matches(f)).collect();
        let (column, direction) = self.sort;
        rows.sort_by(|a, b| {
            let ord = compare(a, b, column);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        rows
    }

    pub fn set_sort(&mut self, column: SortColumn, direction: SortDirection) {
        self.sort = (column, direction);
    }

    /// Clicking the current column flips its direction; a new column starts
    /// ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) {
        self.sort = match self.sort {
            (current, SortDirection::Asc) if current == column => (column, SortDirection::Desc),
            _ => (column, SortDirection::Asc),
        };
    }

    pub fn sort(&self) -> (SortColumn, SortDirection) {
        self.sort
    }

    pub fn set_filter(&mut self, query: &str, category: Option<&str>) {
        self.filter = Filter {
            query: query.trim().to_lowercase(),
            category: category.map(str::to_string),
        };
    }

    // -- selection --

    /// Flip one row's selection. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.remove(id) {
            return false;
        }
        if self.get(id).is_none() {
            return false;
        }
        self.selected.insert(id.to_string())
    }

    pub fn select_all_visible(&mut self) {
        let visible: Vec<String> = self.rows().iter().map(|f| f.id.clone()).collect();
        self.selected.extend(visible);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    // -- bulk operations on the selection --

    pub async fn bulk_delete(&mut self) -> BackendResult<usize> {
        let ids = self.selected_ids();
        if ids.is_empty() {
            return Ok(0);
        }
        self.backend.bulk_delete(&ids).await?;
        self.files.retain(|f| !ids.contains(&f.id));
        self.selected.clear();
        info!(count = ids.len(), "files deleted");
        Ok(ids.len())
    }

    pub async fn bulk_update(&mut self, patch: &MetadataPatch) -> BackendResult<usize> {
        let ids = self.selected_ids();
        if ids.is_empty() || patch.is_empty() {
            return Ok(0);
        }
        self.backend.bulk_update(&ids, patch).await?;
        for file in self.files.iter_mut().filter(|f| ids.contains(&f.id)) {
            file.metadata.apply(patch);
        }
        info!(count = ids.len(), "file metadata updated");
        Ok(ids.len())
    }

    pub async fn bulk_reprocess(&mut self) -> BackendResult<usize> {
        let ids = self.selected_ids();
        if ids.is_empty() {
            return Ok(0);
        }
        self.backend.bulk_reprocess(&ids).await?;
        for file in self.files.iter_mut().filter(|f| ids.contains(&f.id)) {
            file.status = RemoteFileStatus::Processing;
        }
        info!(count = ids.len(), "files queued for reprocessing");
        Ok(ids.len())
    }

    // -- single-row operations --

    pub async fn update_file(&mut self, id: &str, patch: &MetadataPatch) -> BackendResult<()> {
        self.require(id)?;
        self.backend.update(id, patch).await?;
        if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
            file.metadata.apply(patch);
        }
        Ok(())
    }

    pub async fn delete_file(&mut self, id: &str) -> BackendResult<()> {
        self.require(id)?;
        self.backend.delete(id).await?;
        self.files.retain(|f| f.id != id);
        self.selected.remove(id);
        info!(file_id = %id, "file deleted");
        Ok(())
    }

    pub async fn reprocess_file(&mut self, id: &str) -> BackendResult<()> {
        self.require(id)?;
        self.backend.reprocess(id).await?;
        if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
            file.status = RemoteFileStatus::Processing;
        }
        Ok(())
    }

    pub async fn download(&self, id: &str) -> BackendResult<Bytes> {
        self.require(id)?;
        self.backend.download(id).await
    }

    fn require(&self, id: &str) -> BackendResult<()> {
        match self.get(id) {
            Some(_) => Ok(()),
            None => Err(BackendError::general(format!("Unknown file: {id}"))),
        }
    }
}

fn compare(a: &RemoteFile, b: &RemoteFile, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortColumn::Size => a.size.cmp(&b.size),
        // uncategorised rows sort last when ascending
        SortColumn::Category => match (&a.metadata.category, &b.metadata.category) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortColumn::Status => status_rank(a.status).cmp(&status_rank(b.status)),
        SortColumn::UploadedAt => a.uploaded_at.cmp(&b.uploaded_at),
    }
}

fn status_rank(status: RemoteFileStatus) -> u8 {
    match status {
        RemoteFileStatus::Failed => 0,
        RemoteFileStatus::Processing => 1,
        RemoteFileStatus::Ready => 2,
    }
}
