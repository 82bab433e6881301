//! Durable post history: the single source of truth for dedup and quota.

mod normalize;
mod record;
mod sqlite;

pub use normalize::{content_hash, normalize, NORMALIZATION_VERSION};
pub use record::{NewPostRecord, PostRecord, PostStats, PostStatus};
pub use sqlite::SqliteHistoryStore;

use chrono::{DateTime, Utc};

use crate::errors::StorageResult;

/// Append-only store of post attempts.
///
/// Every write is durable before the call returns. Implementations never
/// update a stored record.
pub trait HistoryStore: Send + Sync {
    /// Append a record and return its id.
    fn record(&self, record: &NewPostRecord) -> StorageResult<i64>;

    /// Whether a `success` record with the same normalized content exists.
    fn is_duplicate(&self, content: &str) -> StorageResult<bool>;

    /// Number of `success` records created at or after `since`.
    fn count_since(&self, since: DateTime<Utc>) -> StorageResult<u32>;

    /// The most recent `success` record.
    fn last_success(&self) -> StorageResult<Option<PostRecord>>;

    /// Creation times of `success` records at or after `since`, oldest first.
    fn successes_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<DateTime<Utc>>>;

    /// Newest records first, any status.
    fn recent(&self, limit: usize) -> StorageResult<Vec<PostRecord>>;

    /// Topics of the newest records, newest first.
    fn recent_topics(&self, limit: usize) -> StorageResult<Vec<String>>;

    fn stats(&self) -> StorageResult<PostStats>;

    /// Delete `failed` and `rejected` records older than `cutoff`.
    /// `success` records are kept forever.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize>;
}
