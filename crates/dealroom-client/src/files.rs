//! The active, ordered list of files attached to a submission.

use dealroom_shared::{
    FileError, FileId, FileStatus, FileSummary, MetadataPatch, UploadFile,
};

#[derive(Debug, Clone, Default)]
pub struct FileList {
    files: Vec<UploadFile>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a list from a saved draft. Restored entries have no content
    /// and start over as pending.
    pub fn from_summaries(summaries: &[FileSummary]) -> Self {
        let files = summaries
            .iter()
            .map(|s| UploadFile {
                id: s.id,
                name: s.name.clone(),
                size: s.size,
                mime_type: s.mime_type.clone(),
                status: FileStatus::Pending,
                progress: 0,
                error: None,
                metadata: s.metadata.clone(),
                content: None,
            })
            .collect();
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadFile> {
        self.files.iter()
    }

    pub fn as_slice(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn get(&self, id: FileId) -> Option<&UploadFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: FileId) -> Option<&mut UploadFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub(crate) fn get_index_mut(&mut self, index: usize) -> Option<&mut UploadFile> {
        self.files.get_mut(index)
    }

    /// First non-error file occupying the `(name, size)` slot.
    pub fn find_collision(&self, name: &str, size: u64) -> Option<&UploadFile> {
        self.files.iter().find(|f| f.collides_with(name, size))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    pub fn push(&mut self, file: UploadFile) {
        self.files.push(file);
    }

    pub fn extend(&mut self, files: impl IntoIterator<Item = UploadFile>) {
        self.files.extend(files);
    }

    pub fn remove(&mut self, id: FileId) -> Result<UploadFile, FileError> {
        let index = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(FileError::NotFound(id))?;
        Ok(self.files.remove(index))
    }

    pub fn update_metadata(&mut self, id: FileId, patch: &MetadataPatch) -> Result<(), FileError> {
        let file = self.get_mut(id).ok_or(FileError::NotFound(id))?;
        file.metadata_mut().apply(patch);
        Ok(())
    }

    /// Apply one patch to many files. Unknown ids are skipped; returns how
    /// many files were changed.
    pub fn bulk_update_metadata(&mut self, ids: &[FileId], patch: &MetadataPatch) -> usize {
        let mut updated = 0;
        for file in self.files.iter_mut().filter(|f| ids.contains(&f.id)) {
            file.metadata_mut().apply(patch);
            updated += 1;
        }
        updated
    }

    /// Move every failed file back to pending. Returns how many were reset.
    pub fn reset_failed(&mut self) -> usize {
        self.files
            .iter_mut()
            .filter(|f| f.status == FileStatus::Error)
            .filter_map(|f| f.reset_for_retry().ok())
            .count()
    }

    pub fn count_with_status(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn summaries(&self) -> Vec<FileSummary> {
        self.files.iter().map(FileSummary::from).collect()
    }
}
