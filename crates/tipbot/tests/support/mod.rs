//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tipbot::config::ContentConfig;
use tipbot::errors::StorageResult;
use tipbot::filter::ContentFilter;
use tipbot::generator::{Constraints, ContentGenerator, GenerationError};
use tipbot::history::{
    HistoryStore, NewPostRecord, PostRecord, PostStats, PostStatus, SqliteHistoryStore,
};
use tipbot::StorageError;
use tipbot::pipeline::{Pipeline, PipelineConfig};
use tipbot::platform::{Platform, PlatformError, PostReceipt};
use tipbot::quota::QuotaPolicy;
use tipbot::retry::RetryPolicy;

pub fn receipt(id: &str) -> PostReceipt {
    PostReceipt {
        platform_post_id: id.to_string(),
        posted_at: Utc::now(),
    }
}

/// Platform that replays queued results. Once the queue is empty every post
/// succeeds with a fresh id.
#[derive(Default)]
pub struct ScriptedPlatform {
    results: Mutex<VecDeque<Result<PostReceipt, PlatformError>>>,
    lookup: Mutex<Option<PostReceipt>>,
    call_delay: Option<Duration>,
    pub posts: AtomicUsize,
    pub lookups: AtomicUsize,
    pub posted_texts: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(
        results: impl IntoIterator<Item = Result<PostReceipt, PlatformError>>,
    ) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// What `find_recent_post` reports.
    pub fn with_lookup(self, receipt: Option<PostReceipt>) -> Self {
        *self.lookup.lock().unwrap() = receipt;
        self
    }

    /// Make every post call take `delay` before answering.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn post_count(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn post(&self, text: &str) -> Result<PostReceipt, PlatformError> {
        let call = self.posts.fetch_add(1, Ordering::SeqCst) + 1;
        self.posted_texts.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(receipt(&format!("post-{call}"))))
    }

    async fn find_recent_post(&self, _text: &str) -> Result<Option<PostReceipt>, PlatformError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup.lock().unwrap().clone())
    }

    async fn verify_credentials(&self) -> Result<String, PlatformError> {
        Ok("@scripted".to_string())
    }
}

/// Generator that replays queued bodies and records the topics asked for.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    pub topics: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            topics: Mutex::new(Vec::new()),
        }
    }

    pub fn texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.to_string())))
    }

    pub fn requested_topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(
        &self,
        topic: &str,
        _constraints: &Constraints,
    ) -> Result<String, GenerationError> {
        self.topics.lock().unwrap().push(topic.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Permanent("script exhausted".to_string())))
    }
}

/// SQLite store whose writes of one status fail, as on a full disk.
pub struct FailingStore {
    inner: SqliteHistoryStore,
    fail_on: PostStatus,
    pub failed_writes: AtomicUsize,
}

impl FailingStore {
    pub fn failing_on(fail_on: PostStatus) -> Self {
        Self {
            inner: SqliteHistoryStore::open_in_memory().unwrap(),
            fail_on,
            failed_writes: AtomicUsize::new(0),
        }
    }

    pub fn failed_write_count(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }
}

impl HistoryStore for FailingStore {
    fn record(&self, record: &NewPostRecord) -> StorageResult<i64> {
        if record.status == self.fail_on {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Io {
                path: "history.db".to_string(),
                reason: "No space left on device".to_string(),
            });
        }
        self.inner.record(record)
    }

    fn is_duplicate(&self, content: &str) -> StorageResult<bool> {
        self.inner.is_duplicate(content)
    }

    fn count_since(&self, since: DateTime<Utc>) -> StorageResult<u32> {
        self.inner.count_since(since)
    }

    fn last_success(&self) -> StorageResult<Option<PostRecord>> {
        self.inner.last_success()
    }

    fn successes_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<DateTime<Utc>>> {
        self.inner.successes_since(since)
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<PostRecord>> {
        self.inner.recent(limit)
    }

    fn recent_topics(&self, limit: usize) -> StorageResult<Vec<String>> {
        self.inner.recent_topics(limit)
    }

    fn stats(&self) -> StorageResult<PostStats> {
        self.inner.stats()
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.prune_before(cutoff)
    }
}

pub fn topics() -> Vec<String> {
    ["Rust", "Go", "SQL"].iter().map(ToString::to_string).collect()
}

/// Pipeline settings with no spacing rule and short backoff.
pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        topics: topics(),
        max_regenerations: 3,
        run_deadline: Duration::from_secs(60),
        dry_run: false,
        quota: QuotaPolicy {
            max_per_day: 50,
            rate_limit_buffer: 1.0,
            windows: Vec::new(),
            min_interval: Duration::ZERO,
        },
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
        },
    }
}

pub fn store() -> Arc<SqliteHistoryStore> {
    Arc::new(SqliteHistoryStore::open_in_memory().unwrap())
}

pub fn filter() -> ContentFilter {
    ContentFilter::from_config(&ContentConfig::default()).unwrap()
}

pub fn pipeline(
    config: PipelineConfig,
    store: Arc<dyn HistoryStore>,
    generator: Arc<dyn ContentGenerator>,
    platform: Arc<dyn Platform>,
) -> Pipeline {
    Pipeline::new(config, filter(), store, generator, platform)
}
