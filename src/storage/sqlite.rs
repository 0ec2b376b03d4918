use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{BatchStore, Collections, Entity, Repository};
use crate::domain::{timestamp, BatchRevision, BatchStatus, DataType, ImportBatch};
use crate::error::{ImportError, Result};

pub const DATABASE_FILE: &str = "school_import.db";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS import_batches (
        id              TEXT PRIMARY KEY,
        data_type       TEXT NOT NULL,
        file_name       TEXT NOT NULL,
        raw_content     TEXT NOT NULL,
        content_sha256  TEXT NOT NULL,
        submitted_by    TEXT NOT NULL,
        submitted_at    TEXT NOT NULL,
        status          TEXT NOT NULL,
        reviewed_by     TEXT,
        reviewed_at     TEXT,
        failure_reason  TEXT,
        skipped_lines   TEXT NOT NULL DEFAULT '[]',
        apply_claim     TEXT,
        claimed_at      TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_import_batches_submitted
        ON import_batches (submitted_at DESC, id);
    CREATE INDEX IF NOT EXISTS idx_import_batches_content
        ON import_batches (status, data_type, content_sha256);
    CREATE TABLE IF NOT EXISTS entities (
        collection  TEXT NOT NULL,
        entity_key  TEXT NOT NULL,
        body        TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        PRIMARY KEY (collection, entity_key)
    );
"#;

const BATCH_COLUMNS: &str = "id, data_type, file_name, raw_content, content_sha256, submitted_by, \
     submitted_at, status, reviewed_by, reviewed_at, failure_reason, skipped_lines, apply_claim, claimed_at";

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Fixed-width UTC text sorts lexically in time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ImportError::Storage {
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

/// One SQLite database holding the batch audit trail and every target collection.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: SharedConnection,
}

impl SqliteCatalog {
    /// Open (or create) `<data_root>/school_import.db`.
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        std::fs::create_dir_all(data_root.as_ref())?;
        let db_path = data_root.as_ref().join(DATABASE_FILE);
        info!("Opening import database at {}", db_path.display());
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn batch_store(&self) -> SqliteBatchStore {
        SqliteBatchStore {
            conn: self.conn.clone(),
        }
    }

    pub fn repository<E: Entity>(&self) -> SqliteRepository<E> {
        SqliteRepository {
            conn: self.conn.clone(),
            _entity: PhantomData,
        }
    }

    pub fn collections(&self) -> Collections {
        Collections {
            classes: Arc::new(self.repository()),
            students: Arc::new(self.repository()),
            teachers: Arc::new(self.repository()),
            grades: Arc::new(self.repository()),
            transactions: Arc::new(self.repository()),
            inventory: Arc::new(self.repository()),
            users: Arc::new(self.repository()),
        }
    }
}

pub struct SqliteBatchStore {
    conn: SharedConnection,
}

struct BatchRow {
    id: String,
    data_type: String,
    file_name: String,
    raw_content: String,
    content_sha256: String,
    submitted_by: String,
    submitted_at: String,
    status: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    failure_reason: Option<String>,
    skipped_lines: String,
    apply_claim: Option<String>,
    claimed_at: Option<String>,
}

impl BatchRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data_type: row.get(1)?,
            file_name: row.get(2)?,
            raw_content: row.get(3)?,
            content_sha256: row.get(4)?,
            submitted_by: row.get(5)?,
            submitted_at: row.get(6)?,
            status: row.get(7)?,
            reviewed_by: row.get(8)?,
            reviewed_at: row.get(9)?,
            failure_reason: row.get(10)?,
            skipped_lines: row.get(11)?,
            apply_claim: row.get(12)?,
            claimed_at: row.get(13)?,
        })
    }

    fn into_batch(self) -> Result<ImportBatch> {
        Ok(ImportBatch {
            id: self.id,
            data_type: self.data_type.parse()?,
            file_name: self.file_name,
            raw_content: self.raw_content,
            content_sha256: self.content_sha256,
            submitted_by: self.submitted_by,
            submitted_at: parse_ts(&self.submitted_at)?,
            status: self.status.parse()?,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at.as_deref().map(parse_ts).transpose()?,
            failure_reason: self.failure_reason,
            skipped_lines: serde_json::from_str(&self.skipped_lines)?,
            apply_claim: self.apply_claim,
            claimed_at: self.claimed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[async_trait]
impl BatchStore for SqliteBatchStore {
    async fn insert(&self, batch: &ImportBatch) -> Result<()> {
        let conn = lock(&self.conn);
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO import_batches (id, data_type, file_name, raw_content, content_sha256,
                 submitted_by, submitted_at, status, reviewed_by, reviewed_at, failure_reason, skipped_lines,
                 apply_claim, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                batch.id,
                batch.data_type.as_str(),
                batch.file_name,
                batch.raw_content,
                batch.content_sha256,
                batch.submitted_by,
                format_ts(&batch.submitted_at),
                batch.status.as_str(),
                batch.reviewed_by,
                batch.reviewed_at.as_ref().map(format_ts),
                batch.failure_reason,
                serde_json::to_string(&batch.skipped_lines)?,
                batch.apply_claim,
                batch.claimed_at.as_ref().map(format_ts),
            ],
        )?;
        if inserted == 0 {
            return Err(ImportError::DuplicateBatch(batch.id.clone()));
        }
        debug!("Stored import batch {}", batch.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ImportBatch>> {
        let conn = lock(&self.conn);
        let row = conn
            .query_row(
                &format!("SELECT {} FROM import_batches WHERE id = ?1", BATCH_COLUMNS),
                params![id],
                BatchRow::read,
            )
            .optional()?;
        row.map(BatchRow::into_batch).transpose()
    }

    async fn list(&self) -> Result<Vec<ImportBatch>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_batches ORDER BY submitted_at DESC, id ASC",
            BATCH_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], BatchRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    async fn find_pending_by_hash(
        &self,
        data_type: DataType,
        content_sha256: &str,
    ) -> Result<Option<String>> {
        let conn = lock(&self.conn);
        let id = conn
            .query_row(
                "SELECT id FROM import_batches
                 WHERE status = ?1 AND data_type = ?2 AND content_sha256 = ?3
                 ORDER BY submitted_at ASC, id ASC
                 LIMIT 1",
                params![BatchStatus::Pending.as_str(), data_type.as_str(), content_sha256],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    async fn replace(&self, batch: &ImportBatch) -> Result<()> {
        let conn = lock(&self.conn);
        let changed = conn.execute(
            "UPDATE import_batches
             SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, failure_reason = ?5, skipped_lines = ?6,
                 apply_claim = ?7, claimed_at = ?8
             WHERE id = ?1",
            params![
                batch.id,
                batch.status.as_str(),
                batch.reviewed_by,
                batch.reviewed_at.as_ref().map(format_ts),
                batch.failure_reason,
                serde_json::to_string(&batch.skipped_lines)?,
                batch.apply_claim,
                batch.claimed_at.as_ref().map(format_ts),
            ],
        )?;
        if changed == 0 {
            return Err(ImportError::BatchNotFound(batch.id.clone()));
        }
        debug!("Updated import batch {} to {}", batch.id, batch.status);
        Ok(())
    }

    async fn compare_and_replace(
        &self,
        expected: &BatchRevision,
        batch: &ImportBatch,
    ) -> Result<bool> {
        let conn = lock(&self.conn);
        // `IS` so that an unclaimed batch matches an expected NULL claim.
        let changed = conn.execute(
            "UPDATE import_batches
             SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, failure_reason = ?5, skipped_lines = ?6,
                 apply_claim = ?7, claimed_at = ?8
             WHERE id = ?1 AND status = ?9 AND apply_claim IS ?10",
            params![
                batch.id,
                batch.status.as_str(),
                batch.reviewed_by,
                batch.reviewed_at.as_ref().map(format_ts),
                batch.failure_reason,
                serde_json::to_string(&batch.skipped_lines)?,
                batch.apply_claim,
                batch.claimed_at.as_ref().map(format_ts),
                expected.status.as_str(),
                expected.apply_claim,
            ],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM import_batches WHERE id = ?1)",
            params![batch.id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(false)
        } else {
            Err(ImportError::BatchNotFound(batch.id.clone()))
        }
    }
}

/// A target collection stored as one JSON document per key.
pub struct SqliteRepository<E: Entity> {
    conn: SharedConnection,
    _entity: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E: Entity> Repository<E> for SqliteRepository<E> {
    async fn find_by_key(&self, key: &E::Key) -> Result<Option<E>> {
        let conn = lock(&self.conn);
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM entities WHERE collection = ?1 AND entity_key = ?2",
                params![E::COLLECTION, E::storage_key(key)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn upsert(&self, entity: E) -> Result<()> {
        let key = entity.key();
        let body = serde_json::to_string(&entity)?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO entities (collection, entity_key, body, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, entity_key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![E::COLLECTION, E::storage_key(&key), body, format_ts(&timestamp())],
        )?;
        debug!("Upserted {} {}", E::COLLECTION, key);
        Ok(())
    }
}
