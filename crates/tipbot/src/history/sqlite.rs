//! SQLite-backed history store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::normalize::{content_hash, NORMALIZATION_VERSION};
use super::record::{NewPostRecord, PostRecord, PostStats, PostStatus};
use super::HistoryStore;
use crate::errors::{StorageError, StorageResult};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS posts (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    content          TEXT    NOT NULL,
    content_hash     TEXT    NOT NULL,
    hash_version     INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    status           TEXT    NOT NULL CHECK (status IN ('success', 'failed', 'rejected')),
    error_message    TEXT,
    topic            TEXT    NOT NULL,
    platform_post_id TEXT,
    CHECK ((status = 'success') = (error_message IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_success_hash
    ON posts (content_hash, hash_version) WHERE status = 'success';

CREATE INDEX IF NOT EXISTS idx_posts_status_created
    ON posts (status, created_at);

CREATE TRIGGER IF NOT EXISTS posts_append_only
    BEFORE UPDATE ON posts
BEGIN
    SELECT RAISE(ABORT, 'posts are append-only');
END;
";

const RECORD_COLUMNS: &str = "id, content, content_hash, hash_version, created_at, status, \
                              error_message, topic, platform_post_id";

/// History store over a single SQLite connection.
///
/// WAL mode plus a busy timeout lets overlapping invocations of the binary
/// serialize their writes instead of failing.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened history database");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {ms} out of range").into(),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        content_hash: row.get(2)?,
        hash_version: row.get(3)?,
        created_at: from_millis(4, row.get(4)?)?,
        status: row.get(5)?,
        error_message: row.get(6)?,
        topic: row.get(7)?,
        platform_post_id: row.get(8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl HistoryStore for SqliteHistoryStore {
    fn record(&self, record: &NewPostRecord) -> StorageResult<i64> {
        record.validate()?;
        let hash = content_hash(&record.content);

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO posts (content, content_hash, hash_version, created_at, status,
                                error_message, topic, platform_post_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.content,
                hash,
                NORMALIZATION_VERSION,
                to_millis(record.created_at),
                record.status,
                record.error_message,
                record.topic,
                record.platform_post_id,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::debug!(
                    id,
                    status = %record.status,
                    topic = %record.topic,
                    "Recorded post attempt"
                );
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::DuplicateSuccess { content_hash: hash })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_duplicate(&self, content: &str) -> StorageResult<bool> {
        let hash = content_hash(content);
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM posts
                 WHERE status = 'success' AND content_hash = ?1 AND hash_version = ?2
             )",
            params![hash, NORMALIZATION_VERSION],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn count_since(&self, since: DateTime<Utc>) -> StorageResult<u32> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE status = 'success' AND created_at >= ?1",
            params![to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn last_success(&self) -> StorageResult<Option<PostRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM posts
                     WHERE status = 'success'
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                [],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn successes_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<DateTime<Utc>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT created_at FROM posts
             WHERE status = 'success' AND created_at >= ?1
             ORDER BY created_at ASC",
        )?;
        let times = stmt
            .query_map(params![to_millis(since)], |row| from_millis(0, row.get(0)?))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(times)
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<PostRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM posts ORDER BY id DESC LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn recent_topics(&self, limit: usize) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT topic FROM posts ORDER BY id DESC LIMIT ?1")?;
        let topics = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(topics)
    }

    fn stats(&self) -> StorageResult<PostStats> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM posts GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, PostStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = PostStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status {
                PostStatus::Success => stats.success = count,
                PostStatus::Failed => stats.failed = count,
                PostStatus::Rejected => stats.rejected = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM posts WHERE status != 'success' AND created_at < ?1",
            params![to_millis(cutoff)],
        )?;
        tracing::info!(deleted, cutoff = %cutoff, "Pruned old failed/rejected records");
        Ok(deleted)
    }
}
