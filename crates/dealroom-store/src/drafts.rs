use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use dealroom_shared::{DealFields, DraftId, DraftPatch, DraftState, FileSummary};

use crate::database::Database;
use crate::error::{Result, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, name, description, website, funding_target, active_section,
            files_json, saved_at, version
     FROM drafts";

impl Database {
    /// Merge `patch` into the stored draft and bump its version.
    ///
    /// Creates the draft when it does not exist yet; a patch without an id
    /// gets a fresh `local-` id. The read and the write happen inside one
    /// immediate transaction, so a concurrent writer on the same file either
    /// sees this write or is seen by it.
    pub fn save_draft(&mut self, patch: &DraftPatch) -> Result<DraftState> {
        let id = patch.id.clone().unwrap_or_else(DraftId::new_local);

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        // stored at microsecond precision; return exactly what is persisted
        let now = Utc::now().trunc_subsecs(6);
        let mut draft = select_draft(&tx, &id)?.unwrap_or_else(|| DraftState::empty(id, now));
        draft.apply(patch);
        draft.version += 1;
        draft.saved_at = now.max(draft.saved_at);

        tx.execute(
            "INSERT INTO drafts (id, name, description, website, funding_target, active_section,
                                 files_json, saved_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                website = excluded.website,
                funding_target = excluded.funding_target,
                active_section = excluded.active_section,
                files_json = excluded.files_json,
                saved_at = excluded.saved_at,
                version = excluded.version",
            params![
                draft.id.as_str(),
                draft.fields.name,
                draft.fields.description,
                draft.fields.website,
                draft.fields.funding_target.map(|v| v as i64),
                draft.active_section,
                serde_json::to_string(&draft.files)?,
                format_ts(&draft.saved_at),
                draft.version as i64,
            ],
        )?;
        tx.commit()?;

        debug!(draft_id = %draft.id, version = draft.version, files = draft.files.len(), "draft saved");
        Ok(draft)
    }

    pub fn load_draft(&self, id: &DraftId) -> Result<DraftState> {
        select_draft(self.conn(), id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Every stored draft, most recently saved first.
    pub fn list_drafts(&self) -> Result<Vec<DraftState>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY saved_at DESC, version DESC"))?;
        let drafts = stmt
            .query_map([], row_to_draft)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(drafts)
    }

    // idempotent: deleting a missing draft is not an error
    pub fn delete_draft(&self, id: &DraftId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM drafts WHERE id = ?1", params![id.as_str()])?;
        if affected > 0 {
            debug!(draft_id = %id, "draft deleted");
        }
        Ok(affected > 0)
    }

    pub fn draft_version(&self, id: &DraftId) -> Result<Option<u64>> {
        let version: Option<i64> = self
            .conn()
            .query_row(
                "SELECT version FROM drafts WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map(|v| v as u64))
    }

    /// True iff someone stored a newer version than `known_version`.
    pub fn check_conflict(&self, id: &DraftId, known_version: u64) -> Result<bool> {
        Ok(self
            .draft_version(id)?
            .is_some_and(|stored| stored > known_version))
    }
}

fn select_draft(conn: &Connection, id: &DraftId) -> Result<Option<DraftState>> {
    let draft = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.as_str()],
            row_to_draft,
        )
        .optional()?;
    Ok(draft)
}

// fixed precision keeps lexicographic order == chronological order
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftState> {
    let id: String = row.get(0)?;
    let name: Option<String> = row.get(1)?;
    let description: Option<String> = row.get(2)?;
    let website: Option<String> = row.get(3)?;
    let funding_target: Option<i64> = row.get(4)?;
    let active_section: Option<String> = row.get(5)?;
    let files_json: String = row.get(6)?;
    let saved_str: String = row.get(7)?;
    let version: i64 = row.get(8)?;

    let files: Vec<FileSummary> = serde_json::from_str(&files_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let saved_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&saved_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DraftState {
        id: DraftId(id),
        fields: DealFields {
            name,
            description,
            website,
            funding_target: funding_target.map(|v| v as u64),
        },
        active_section,
        files,
        saved_at,
        version: version as u64,
    })
}
