//! History storage: the per-project `SQLite` ledger.

use std::path::Path;

use jiff::Timestamp;
use rusqlite::Connection;

use crate::model::{HistoryEntry, HistoryEvent, StageId};

use super::{HISTORY_FILE, Result, Storage, StorageError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    stage TEXT,
    detail TEXT,
    recorded_at TEXT NOT NULL
)";

/// Opens the ledger in a project directory, creating the table if needed.
pub(super) fn open_ledger(dir: &Path) -> Result<Connection> {
    let conn = Connection::open(dir.join(HISTORY_FILE))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub(super) fn append(
    conn: &Connection,
    event: HistoryEvent,
    stage: Option<StageId>,
    detail: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO history (event, stage, detail, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            event.as_str(),
            stage.map(StageId::as_str),
            detail,
            Timestamp::now().to_string(),
        ],
    )?;
    Ok(())
}

impl Storage {
    /// Appends an event to a project's history.
    pub fn record_history(
        &self,
        id: &str,
        event: HistoryEvent,
        stage: Option<StageId>,
        detail: Option<&str>,
    ) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        let conn = open_ledger(&dir)?;
        append(&conn, event, stage, detail)
    }

    /// Loads a project's history, oldest first.
    pub fn load_history(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        let dir = self.existing_project_dir(id)?;
        let conn = open_ledger(&dir)?;
        let mut stmt =
            conn.prepare("SELECT seq, event, stage, detail, recorded_at FROM history ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, event, stage, detail, recorded_at) = row?;
            entries.push(HistoryEntry {
                seq,
                event: event
                    .parse::<HistoryEvent>()
                    .map_err(|e| StorageError::Corrupt(format!("history #{seq}: {e}")))?,
                stage: stage
                    .map(|s| s.parse::<StageId>())
                    .transpose()
                    .map_err(|e| StorageError::Corrupt(format!("history #{seq}: {e}")))?,
                detail,
                recorded_at: recorded_at
                    .parse::<Timestamp>()
                    .map_err(|e| StorageError::Corrupt(format!("history #{seq}: {e}")))?,
            });
        }
        Ok(entries)
    }
}
