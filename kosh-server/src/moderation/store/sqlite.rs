//! SQLite implementation of `EntityStore`.
//!
//! Durable storage that survives restarts. Entities are stored as JSON
//! payloads with relational columns for the fields queries filter on
//! (status, version, created_at). The version column backs the
//! compare-and-swap contract: every conditional write is
//! `UPDATE ... WHERE id = ? AND version = ?`, so a concurrent writer that
//! committed first makes the update affect zero rows and the caller retries
//! with a fresh read.
//!
//! # Schema versioning
//!
//! A `schema_version` table tracks the schema. When the schema changes,
//! increment `CURRENT_SCHEMA_VERSION` and add a migration in
//! `run_migrations()`; migrations run sequentially from the stored version
//! to the target.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kosh_core::{CorrectionId, ReportId, WordId};
use rusqlite::{params, Connection, OptionalExtension};

use super::{EntityStore, Versioned};
use crate::moderation::entity::{
    CorrectionEntity, CorrectionStatus, ReportEntity, ReportStatus, WordEntity, WordStatus,
};
use crate::moderation::error::ModerationError;

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed entity store.
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`;
/// operations run inside `tokio::task::spawn_blocking` so the async runtime
/// is never blocked on the database.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    ///
    /// The database is configured with `journal_mode = WAL` and
    /// `busy_timeout = 5000ms`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ModerationError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| ModerationError::storage("open database", e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self, ModerationError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ModerationError::storage("open database", e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ModerationError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ModerationError::storage("set journal_mode", e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))
            .map_err(|e| ModerationError::storage("set busy_timeout", e.to_string()))?;

        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T, ModerationError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, ModerationError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| ModerationError::storage(op, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ModerationError::storage(op, e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), ModerationError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| ModerationError::storage("create schema_version table", e.to_string()))?;

    let version: Option<i64> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| ModerationError::storage("get schema version", e.to_string()))?;

    run_migrations(conn, version.unwrap_or(0))
}

fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), ModerationError> {
    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(ModerationError::storage(
            "run migrations",
            format!(
                "database schema version {} is newer than supported version {}",
                from_version, CURRENT_SCHEMA_VERSION
            ),
        ));
    }

    if from_version < 1 {
        conn.execute_batch(
            "CREATE TABLE words (
                 id TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 version INTEGER NOT NULL,
                 payload TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX idx_words_status ON words (status);

             CREATE TABLE corrections (
                 id TEXT PRIMARY KEY,
                 word_id TEXT NOT NULL,
                 status TEXT NOT NULL,
                 version INTEGER NOT NULL,
                 payload TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX idx_corrections_status ON corrections (status);
             CREATE INDEX idx_corrections_word ON corrections (word_id);

             CREATE TABLE reports (
                 id TEXT PRIMARY KEY,
                 word_id TEXT NOT NULL,
                 status TEXT NOT NULL,
                 version INTEGER NOT NULL,
                 payload TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX idx_reports_status ON reports (status);",
        )
        .map_err(|e| ModerationError::storage("migration v1", e.to_string()))?;
    }

    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| ModerationError::storage("update schema version", e.to_string()))?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )
    .map_err(|e| ModerationError::storage("update schema version", e.to_string()))?;
    Ok(())
}

fn to_json<T: serde::Serialize>(op: &'static str, value: &T) -> Result<String, ModerationError> {
    serde_json::to_string(value).map_err(|e| ModerationError::storage(op, e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(
    op: &'static str,
    payload: &str,
) -> Result<T, ModerationError> {
    serde_json::from_str(payload)
        .map_err(|e| ModerationError::storage(op, format!("corrupt payload: {}", e)))
}

fn insert_row(
    conn: &Connection,
    op: &'static str,
    sql: &str,
    id: String,
    word_id: Option<String>,
    status: &str,
    payload: String,
    created_at: String,
) -> Result<(), ModerationError> {
    let result = match word_id {
        Some(word_id) => conn.execute(sql, params![id, word_id, status, payload, created_at]),
        None => conn.execute(sql, params![id, status, payload, created_at]),
    };
    result.map_err(|e| ModerationError::storage(op, e.to_string()))?;
    Ok(())
}

fn load_row<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    op: &'static str,
    table: &str,
    id: &str,
) -> Result<Option<Versioned<T>>, ModerationError> {
    let sql = format!("SELECT version, payload FROM {table} WHERE id = ?1");
    let row: Option<(i64, String)> = conn
        .query_row(&sql, params![id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()
        .map_err(|e| ModerationError::storage(op, e.to_string()))?;

    match row {
        None => Ok(None),
        Some((version, payload)) => Ok(Some(Versioned {
            version: version as u64,
            value: from_json(op, &payload)?,
        })),
    }
}

fn conditional_update(
    conn: &Connection,
    op: &'static str,
    table: &str,
    id: &str,
    expected_version: u64,
    status: &str,
    payload: &str,
) -> Result<bool, ModerationError> {
    let sql = format!(
        "UPDATE {table} SET payload = ?1, status = ?2, version = version + 1
         WHERE id = ?3 AND version = ?4"
    );
    let rows = conn
        .execute(&sql, params![payload, status, id, expected_version as i64])
        .map_err(|e| ModerationError::storage(op, e.to_string()))?;
    Ok(rows == 1)
}

fn list_rows<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    op: &'static str,
    table: &str,
    status: Option<&str>,
) -> Result<Vec<T>, ModerationError> {
    let (sql, status_param) = match status {
        Some(s) => (
            format!("SELECT payload FROM {table} WHERE status = ?1 ORDER BY created_at"),
            Some(s.to_string()),
        ),
        None => (
            format!("SELECT payload FROM {table} ORDER BY created_at"),
            None,
        ),
    };
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| ModerationError::storage(op, e.to_string()))?;

    let map_row = |row: &rusqlite::Row<'_>| row.get::<_, String>(0);
    let rows = match status_param {
        Some(s) => stmt.query_map(params![s], map_row),
        None => stmt.query_map([], map_row),
    }
    .map_err(|e| ModerationError::storage(op, e.to_string()))?;

    let mut out = Vec::new();
    for payload in rows {
        let payload = payload.map_err(|e| ModerationError::storage(op, e.to_string()))?;
        out.push(from_json(op, &payload)?);
    }
    Ok(out)
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn create_word(&self, word: &WordEntity) -> Result<(), ModerationError> {
        let id = word.id.to_string();
        let status = word.status.as_str();
        let payload = to_json("create word", word)?;
        let created_at = word.created_at.to_rfc3339();
        self.with_conn("create word", move |conn| {
            insert_row(
                conn,
                "create word",
                "INSERT INTO words (id, status, version, payload, created_at)
                 VALUES (?1, ?2, 1, ?3, ?4)",
                id,
                None,
                status,
                payload,
                created_at,
            )
        })
        .await
    }

    async fn load_word(
        &self,
        id: WordId,
    ) -> Result<Option<Versioned<WordEntity>>, ModerationError> {
        let id = id.to_string();
        self.with_conn("load word", move |conn| {
            load_row(conn, "load word", "words", &id)
        })
        .await
    }

    async fn store_word(
        &self,
        expected_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError> {
        let id = word.id.to_string();
        let status = word.status.as_str();
        let payload = to_json("store word", word)?;
        self.with_conn("store word", move |conn| {
            conditional_update(
                conn,
                "store word",
                "words",
                &id,
                expected_version,
                status,
                &payload,
            )
        })
        .await
    }

    async fn list_words(
        &self,
        status: Option<WordStatus>,
    ) -> Result<Vec<WordEntity>, ModerationError> {
        self.with_conn("list words", move |conn| {
            list_rows(conn, "list words", "words", status.map(|s| s.as_str()))
        })
        .await
    }

    async fn create_correction(
        &self,
        correction: &CorrectionEntity,
    ) -> Result<(), ModerationError> {
        let id = correction.id.to_string();
        let word_id = correction.word_id.to_string();
        let status = correction.status.as_str();
        let payload = to_json("create correction", correction)?;
        let created_at = correction.created_at.to_rfc3339();
        self.with_conn("create correction", move |conn| {
            insert_row(
                conn,
                "create correction",
                "INSERT INTO corrections (id, word_id, status, version, payload, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                id,
                Some(word_id),
                status,
                payload,
                created_at,
            )
        })
        .await
    }

    async fn load_correction(
        &self,
        id: CorrectionId,
    ) -> Result<Option<Versioned<CorrectionEntity>>, ModerationError> {
        let id = id.to_string();
        self.with_conn("load correction", move |conn| {
            load_row(conn, "load correction", "corrections", &id)
        })
        .await
    }

    async fn store_correction(
        &self,
        expected_version: u64,
        correction: &CorrectionEntity,
    ) -> Result<bool, ModerationError> {
        let id = correction.id.to_string();
        let status = correction.status.as_str();
        let payload = to_json("store correction", correction)?;
        self.with_conn("store correction", move |conn| {
            conditional_update(
                conn,
                "store correction",
                "corrections",
                &id,
                expected_version,
                status,
                &payload,
            )
        })
        .await
    }

    async fn list_corrections(
        &self,
        status: Option<CorrectionStatus>,
    ) -> Result<Vec<CorrectionEntity>, ModerationError> {
        self.with_conn("list corrections", move |conn| {
            list_rows(
                conn,
                "list corrections",
                "corrections",
                status.map(|s| s.as_str()),
            )
        })
        .await
    }

    async fn store_correction_with_word(
        &self,
        correction_version: u64,
        correction: &CorrectionEntity,
        word_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError> {
        const OP: &str = "store correction with word";
        let correction_id = correction.id.to_string();
        let correction_status = correction.status.as_str();
        let correction_payload = to_json(OP, correction)?;
        let word_id = word.id.to_string();
        let word_status = word.status.as_str();
        let word_payload = to_json(OP, word)?;

        self.with_conn(OP, move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| ModerationError::storage(OP, e.to_string()))?;

            let correction_ok = conditional_update(
                &tx,
                OP,
                "corrections",
                &correction_id,
                correction_version,
                correction_status,
                &correction_payload,
            )?;
            let word_ok = conditional_update(
                &tx,
                OP,
                "words",
                &word_id,
                word_version,
                word_status,
                &word_payload,
            )?;

            if correction_ok && word_ok {
                tx.commit()
                    .map_err(|e| ModerationError::storage(OP, e.to_string()))?;
                Ok(true)
            } else {
                // Dropping the transaction rolls back the partial update.
                Ok(false)
            }
        })
        .await
    }

    async fn create_report(&self, report: &ReportEntity) -> Result<(), ModerationError> {
        let id = report.id.to_string();
        let word_id = report.word_id.to_string();
        let status = report_status_str(report.status);
        let payload = to_json("create report", report)?;
        let created_at = report.created_at.to_rfc3339();
        self.with_conn("create report", move |conn| {
            insert_row(
                conn,
                "create report",
                "INSERT INTO reports (id, word_id, status, version, payload, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                id,
                Some(word_id),
                status,
                payload,
                created_at,
            )
        })
        .await
    }

    async fn load_report(
        &self,
        id: ReportId,
    ) -> Result<Option<Versioned<ReportEntity>>, ModerationError> {
        let id = id.to_string();
        self.with_conn("load report", move |conn| {
            load_row(conn, "load report", "reports", &id)
        })
        .await
    }

    async fn store_report(
        &self,
        expected_version: u64,
        report: &ReportEntity,
    ) -> Result<bool, ModerationError> {
        let id = report.id.to_string();
        let status = report_status_str(report.status);
        let payload = to_json("store report", report)?;
        self.with_conn("store report", move |conn| {
            conditional_update(
                conn,
                "store report",
                "reports",
                &id,
                expected_version,
                status,
                &payload,
            )
        })
        .await
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportEntity>, ModerationError> {
        self.with_conn("list reports", move |conn| {
            list_rows(
                conn,
                "list reports",
                "reports",
                status.map(report_status_str),
            )
        })
        .await
    }
}

fn report_status_str(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Open => "open",
        ReportStatus::Resolved => "resolved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::entity::WordDraft;
    use chrono::Utc;
    use kosh_core::{Meaning, PartOfSpeech, UserId};

    fn sample_word() -> WordEntity {
        WordEntity::new(
            WordDraft {
                kurukh_word: "khekhel".to_string(),
                meanings: vec![Meaning {
                    language: "en".to_string(),
                    definition: "to play".to_string(),
                    example: None,
                    example_translation: None,
                }],
                part_of_speech: PartOfSpeech::Verb,
                pronunciation: None,
            },
            UserId::from("u1"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_load_roundtrip() {
        let store = SqliteStore::new_in_memory().unwrap();
        let word = sample_word();
        store.create_word(&word).await.unwrap();

        let loaded = store.load_word(word.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.value, word);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_storage_error() {
        let store = SqliteStore::new_in_memory().unwrap();
        let word = sample_word();
        store.create_word(&word).await.unwrap();
        let err = store.create_word(&word).await.unwrap_err();
        assert_eq!(err.kind(), "storage_error");
    }

    #[tokio::test]
    async fn test_conditional_update_respects_version() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut word = sample_word();
        store.create_word(&word).await.unwrap();

        word.votes_for = 1;
        assert!(store.store_word(1, &word).await.unwrap());
        assert!(!store.store_word(1, &word).await.unwrap());
        assert!(store.store_word(2, &word).await.unwrap());

        let loaded = store.load_word(word.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 3);
    }

    #[tokio::test]
    async fn test_list_words_filters_by_status() {
        let store = SqliteStore::new_in_memory().unwrap();
        let word = sample_word();
        store.create_word(&word).await.unwrap();

        let in_review = store
            .list_words(Some(WordStatus::CommunityReview))
            .await
            .unwrap();
        assert_eq!(in_review.len(), 1);

        let approved = store.list_words(Some(WordStatus::Approved)).await.unwrap();
        assert!(approved.is_empty());
    }

    #[tokio::test]
    async fn test_schema_version_written() {
        let store = SqliteStore::new_in_memory().unwrap();
        let version = store
            .with_conn("check version", |conn| {
                conn.query_row("SELECT version FROM schema_version", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(|e| ModerationError::storage("check version", e.to_string()))
            })
            .await
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }
}
