//! v001 -- Initial schema creation.
//!
//! Creates the `drafts` table. The attached file list is kept as one JSON
//! column because it is always read and written as a whole.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS drafts (
    id             TEXT PRIMARY KEY NOT NULL,   -- server id or local-<uuid>
    name           TEXT,
    description    TEXT,
    website        TEXT,
    funding_target INTEGER,
    active_section TEXT,
    files_json     TEXT NOT NULL DEFAULT '[]',  -- ordered FileSummary list
    saved_at       TEXT NOT NULL,               -- RFC-3339, microsecond precision
    version        INTEGER NOT NULL             -- bumped on every write
);

CREATE INDEX IF NOT EXISTS idx_drafts_saved_at ON drafts(saved_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
