//! Scheduled tip bot for X/Twitter.
//!
//! Each invocation runs one cycle:
//! - quota check derived from the SQLite post history
//! - topic rotation and candidate generation (language model or offline catalog)
//! - content filtering with novelty checked against the history
//! - posting with bounded retries and ambiguous-outcome resolution
//! - exactly one terminal history record per run that passes the quota check

pub mod config;
pub mod errors;
pub mod filter;
pub mod generator;
pub mod history;
pub mod pipeline;
pub mod platform;
pub mod quota;
pub mod retry;

// Re-export main types
pub use config::Config;
pub use errors::{ConfigError, StorageError};
pub use filter::{ContentFilter, Rejection, Verdict};
pub use generator::{CatalogGenerator, ContentGenerator, GenerationError, LlmGenerator};
pub use history::{HistoryStore, PostRecord, PostStatus, SqliteHistoryStore};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use platform::{Platform, PlatformError, PostReceipt, TwitterClient};
pub use quota::{QuotaDecision, QuotaGuard};
pub use retry::{PostFailure, PostOutcome, RetryController, RetryPolicy};
