//! Draft snapshots.
//!
//! A [`DraftState`] is the persisted copy of one in-progress submission:
//! the deal form fields, the section the user was on, and a summary of every
//! attached file. File bytes are never part of a draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file::{FileMetadata, UploadFile};
use crate::types::{DraftId, FileId};

/// Parent-entity form fields of a deal submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DealFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    /// Funding target in whole currency units.
    pub funding_target: Option<u64>,
}

/// What a draft remembers about one attached file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub metadata: Option<FileMetadata>,
}

impl From<&UploadFile> for FileSummary {
    fn from(file: &UploadFile) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            metadata: file.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    pub id: DraftId,
    pub fields: DealFields,
    pub active_section: Option<String>,
    pub files: Vec<FileSummary>,
    pub saved_at: DateTime<Utc>,
    /// Bumped on every persisted write.
    pub version: u64,
}

impl DraftState {
    /// An empty, never-saved draft (version 0).
    pub fn empty(id: DraftId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields: DealFields::default(),
            active_section: None,
            files: Vec::new(),
            saved_at: now,
            version: 0,
        }
    }

    /// Field-level merge; fields absent from the patch keep their value.
    pub fn apply(&mut self, patch: &DraftPatch) {
        if let Some(ref name) = patch.name {
            self.fields.name = Some(name.clone());
        }
        if let Some(ref description) = patch.description {
            self.fields.description = Some(description.clone());
        }
        if let Some(ref website) = patch.website {
            self.fields.website = Some(website.clone());
        }
        if let Some(target) = patch.funding_target {
            self.fields.funding_target = Some(target);
        }
        if let Some(ref section) = patch.active_section {
            self.active_section = Some(section.clone());
        }
        if let Some(ref files) = patch.files {
            self.files = files.clone();
        }
    }
}

/// Partial draft state handed to a save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    /// Target draft; `None` creates a new local draft.
    pub id: Option<DraftId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub funding_target: Option<u64>,
    pub active_section: Option<String>,
    pub files: Option<Vec<FileSummary>>,
}

impl DraftPatch {
    pub fn for_draft(id: DraftId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_fields(mut self, fields: &DealFields) -> Self {
        self.name = fields.name.clone();
        self.description = fields.description.clone();
        self.website = fields.website.clone();
        self.funding_target = fields.funding_target;
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.active_section = Some(section.into());
        self
    }

    pub fn with_files(mut self, files: Vec<FileSummary>) -> Self {
        self.files = Some(files);
        self
    }

    /// Fold a later patch into this one: later values win field by field.
    pub fn merge(&mut self, later: DraftPatch) {
        if later.id.is_some() {
            self.id = later.id;
        }
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.description.is_some() {
            self.description = later.description;
        }
        if later.website.is_some() {
            self.website = later.website;
        }
        if later.funding_target.is_some() {
            self.funding_target = later.funding_target;
        }
        if later.active_section.is_some() {
            self.active_section = later.active_section;
        }
        if later.files.is_some() {
            self.files = later.files;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.website.is_none()
            && self.funding_target.is_none()
            && self.active_section.is_none()
            && self.files.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_patch_wins_per_field() {
        let mut pending = DraftPatch {
            name: Some("Acme".into()),
            description: Some("first".into()),
            ..Default::default()
        };
        pending.merge(DraftPatch {
            description: Some("second".into()),
            funding_target: Some(250_000),
            ..Default::default()
        });

        assert_eq!(pending.name.as_deref(), Some("Acme"));
        assert_eq!(pending.description.as_deref(), Some("second"));
        assert_eq!(pending.funding_target, Some(250_000));
        assert!(pending.files.is_none());
    }

    #[test]
    fn test_apply_keeps_fields_missing_from_patch() {
        let mut draft = DraftState::empty(DraftId::from("d1"), Utc::now());
        draft.apply(&DraftPatch {
            name: Some("Acme".into()),
            website: Some("https://acme.test".into()),
            ..Default::default()
        });
        draft.apply(&DraftPatch {
            active_section: Some("documents".into()),
            ..Default::default()
        });

        assert_eq!(draft.fields.name.as_deref(), Some("Acme"));
        assert_eq!(draft.fields.website.as_deref(), Some("https://acme.test"));
        assert_eq!(draft.active_section.as_deref(), Some("documents"));
        assert_eq!(draft.version, 0);
    }

    #[test]
    fn test_file_summary_wire_shape_is_camel_case() {
        let summary = FileSummary {
            id: FileId::new(),
            name: "deck.pdf".into(),
            size: 10,
            mime_type: "application/pdf".into(),
            metadata: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mimeType"], "application/pdf");
        assert!(json.get("mime_type").is_none());

        let back: FileSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }
}
