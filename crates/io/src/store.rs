// Session store using SQLite
//
// Upsert semantics throughout: every save is idempotent on retry.
// Persistence is best-effort by contract. Callers that must not fail use
// the autosave helper, which logs and moves on.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use docket_engine::model::{Match, MatchMethod};
use docket_engine::state::SessionState;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    session_id TEXT NOT NULL,
    reference TEXT NOT NULL,
    path TEXT NOT NULL,
    score REAL NOT NULL,
    method TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    original_date TEXT,
    original_reference TEXT,
    PRIMARY KEY (session_id, reference)
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patterns (
    pattern TEXT PRIMARY KEY,
    matches INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(String),
    Snapshot(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(msg) => write!(f, "store error: {msg}"),
            Self::Snapshot(msg) => write!(f, "snapshot encode error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Sqlite(e.to_string())
}

/// Usage record for one path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRecord {
    pub pattern: String,
    pub matches: u32,
    pub updated_at: String,
}

pub struct MatchStore {
    conn: Connection,
}

impl MatchStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path).map_err(sql_err)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![crate::STORE_SCHEMA_VERSION.to_string()],
        )
        .map_err(sql_err)?;
        Ok(Self { conn })
    }

    // -- matches -------------------------------------------------------------

    /// Replace the stored match list for a session.
    pub fn save_matches(&self, session_id: &str, matches: &[Match]) -> Result<(), StoreError> {
        self.conn.execute("BEGIN TRANSACTION", []).map_err(sql_err)?;
        let result = self.write_matches(session_id, matches);
        if result.is_err() {
            let _ = self.conn.execute("ROLLBACK", []);
            return result;
        }
        self.conn.execute("COMMIT", []).map_err(sql_err)?;
        Ok(())
    }

    fn write_matches(&self, session_id: &str, matches: &[Match]) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM matches WHERE session_id = ?1", params![session_id])
            .map_err(sql_err)?;
        let mut stmt = self
            .conn
            .prepare(
                "INSERT OR REPLACE INTO matches \
                 (session_id, reference, path, score, method, timestamp, original_date, original_reference) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(sql_err)?;
        for m in matches {
            stmt.execute(params![
                session_id,
                m.reference,
                m.path,
                m.score,
                m.method.as_str(),
                m.timestamp,
                m.original_date,
                m.original_reference,
            ])
            .map_err(sql_err)?;
        }
        Ok(())
    }

    pub fn load_matches(&self, session_id: &str) -> Result<Vec<Match>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT reference, path, score, method, timestamp, original_date, original_reference \
                 FROM matches WHERE session_id = ?1 ORDER BY rowid",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let method: String = row.get(3)?;
                Ok(Match {
                    reference: row.get(0)?,
                    path: row.get(1)?,
                    score: row.get(2)?,
                    method: MatchMethod::parse(&method),
                    timestamp: row.get(4)?,
                    session_id: Some(session_id.to_string()),
                    original_date: row.get(5)?,
                    original_reference: row.get(6)?,
                })
            })
            .map_err(sql_err)?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row.map_err(sql_err)?);
        }
        Ok(matches)
    }

    // -- sessions ------------------------------------------------------------

    pub fn save_session(&self, id: &str, state: &SessionState) -> Result<(), StoreError> {
        let snapshot =
            serde_json::to_string(state).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sessions (id, snapshot, saved_at) VALUES (?1, ?2, ?3)",
                params![id, snapshot, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn load_session(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
        let snapshot: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        match snapshot {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Snapshot(e.to_string())),
        }
    }

    /// Best-effort save. A failure is logged and swallowed: losing
    /// durability must never abort or corrupt in-memory matching state.
    pub fn autosave_session(&self, id: &str, state: &SessionState) {
        if let Err(err) = self.save_session(id, state) {
            tracing::warn!(session = id, "session autosave failed: {err}");
        }
        if let Err(err) = self.save_matches(id, &state.matches) {
            tracing::warn!(session = id, "match autosave failed: {err}");
        }
    }

    // -- patterns ------------------------------------------------------------

    pub fn save_pattern(&self, pattern: &str, matches: u32) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO patterns (pattern, matches, updated_at) VALUES (?1, ?2, ?3)",
                params![pattern, matches, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn get_pattern(&self, pattern: &str) -> Result<Option<PatternRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT pattern, matches, updated_at FROM patterns WHERE pattern = ?1",
                params![pattern],
                |row| {
                    Ok(PatternRecord {
                        pattern: row.get(0)?,
                        matches: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(sql_err)
    }
}
