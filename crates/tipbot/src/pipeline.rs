//! Pipeline orchestrator - one quota-check, generate, filter, post, record cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::Config;
use crate::errors::StorageResult;
use crate::filter::{ContentFilter, Verdict};
use crate::generator::{Constraints, ContentGenerator, TopicRotation};
use crate::history::{HistoryStore, NewPostRecord};
use crate::platform::Platform;
use crate::quota::{DenyReason, QuotaDecision, QuotaGuard, QuotaPolicy};
use crate::retry::{PostOutcome, RetryController, RetryPolicy};

/// Records scanned to find the least recently used topic.
const TOPIC_HISTORY_LIMIT: usize = 100;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Topics rotated through.
    pub topics: Vec<String>,
    /// Candidates requested before giving up.
    pub max_regenerations: u32,
    /// Budget for the whole run, from the quota check to the final record.
    pub run_deadline: Duration,
    /// Stop before posting and write nothing.
    pub dry_run: bool,
    pub quota: QuotaPolicy,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topics: config.topics.clone(),
            max_regenerations: config.generator.max_regenerations,
            run_deadline: config.retry.run_deadline(),
            dry_run: false,
            quota: QuotaPolicy::from_config(&config.quota),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Quota refused the run; nothing was written.
    Denied {
        reason: DenyReason,
        retry_after: DateTime<Utc>,
    },
    /// The post is live and recorded as `success`.
    Posted {
        record_id: i64,
        platform_post_id: String,
        content: String,
        topic: String,
        attempts: u32,
    },
    /// Recorded as `failed`.
    Failed {
        record_id: i64,
        reason: String,
        attempts: u32,
    },
    /// Dry run: the candidate that would have been posted, or why there is none.
    DryRun {
        topic: String,
        content: Option<String>,
        reason: Option<String>,
    },
}

/// Result of the candidate loop.
enum Candidate {
    Accepted {
        topic: String,
        text: String,
    },
    Exhausted {
        topic: String,
        content: String,
        reason: String,
    },
}

/// Orchestrates a single run.
pub struct Pipeline {
    config: PipelineConfig,
    filter: ContentFilter,
    store: Arc<dyn HistoryStore>,
    generator: Arc<dyn ContentGenerator>,
    platform: Arc<dyn Platform>,
    retry: RetryController,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        filter: ContentFilter,
        store: Arc<dyn HistoryStore>,
        generator: Arc<dyn ContentGenerator>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let retry = RetryController::new(config.retry, config.run_deadline);
        Self {
            config,
            filter,
            store,
            generator,
            platform,
            retry,
        }
    }

    /// Run one cycle.
    ///
    /// Every run that passes the quota check writes exactly one terminal
    /// record (`success` or `failed`), except dry runs which write nothing. A
    /// `StorageError` aborts the run without further writes.
    pub async fn run(&self) -> StorageResult<RunReport> {
        let deadline = Instant::now() + self.config.run_deadline;
        let dry_run = self.config.dry_run;

        tracing::info!(
            generator = self.generator.name(),
            platform = self.platform.name(),
            dry_run,
            "Starting run"
        );

        let guard = QuotaGuard::new(self.store.clone(), self.config.quota.clone());
        if let QuotaDecision::Denied {
            reason,
            retry_after,
        } = guard.may_post_now()?
        {
            tracing::info!(%reason, %retry_after, "Quota denies posting, nothing to do");
            return Ok(RunReport::Denied {
                reason,
                retry_after,
            });
        }

        let (topic, text) = match self.select_candidate(deadline).await? {
            Candidate::Accepted { topic, text } => (topic, text),
            Candidate::Exhausted {
                topic,
                content,
                reason,
            } => {
                let reason = format!("NoValidCandidate: {reason}");
                tracing::warn!(%topic, %reason, "No acceptable candidate");
                if dry_run {
                    return Ok(RunReport::DryRun {
                        topic,
                        content: None,
                        reason: Some(reason),
                    });
                }
                let record_id = self
                    .store
                    .record(&NewPostRecord::failed(content, topic, &reason, Utc::now()))?;
                return Ok(RunReport::Failed {
                    record_id,
                    reason,
                    attempts: 0,
                });
            }
        };

        if dry_run {
            tracing::info!(%topic, "Dry run, not posting");
            return Ok(RunReport::DryRun {
                topic,
                content: Some(text),
                reason: None,
            });
        }

        let started = Utc::now();
        let outcome = self
            .retry
            .execute_until(self.platform.as_ref(), &text, deadline)
            .await;

        match outcome {
            PostOutcome::Posted { receipt, attempts } => {
                let record_id = self.store.record(&NewPostRecord::success(
                    &text,
                    &topic,
                    &receipt.platform_post_id,
                    started,
                ))?;
                tracing::info!(record_id, %topic, attempts, "Run complete, post recorded");
                Ok(RunReport::Posted {
                    record_id,
                    platform_post_id: receipt.platform_post_id,
                    content: text,
                    topic,
                    attempts,
                })
            }
            PostOutcome::Failed { error, attempts } => {
                let reason = error.to_string();
                let record_id = self
                    .store
                    .record(&NewPostRecord::failed(&text, &topic, &reason, started))?;
                tracing::error!(
                    record_id,
                    %topic,
                    attempts,
                    %reason,
                    "Run failed, failure recorded"
                );
                Ok(RunReport::Failed {
                    record_id,
                    reason,
                    attempts,
                })
            }
        }
    }

    /// Generate, compose and filter until a candidate passes or the attempts
    /// run out. Rejections are recorded unless this is a dry run.
    async fn select_candidate(&self, deadline: Instant) -> StorageResult<Candidate> {
        // Topics tried this run go in front of the stored history, so each
        // regeneration moves on to another topic even when nothing is written.
        let mut recent = self.store.recent_topics(TOPIC_HISTORY_LIMIT)?;
        let constraints = Constraints {
            max_length: self.filter.body_budget(),
        };

        let mut last_topic = String::new();
        let mut last_content = String::new();
        let mut last_reason = "no topics configured".to_string();

        let attempts = self.config.max_regenerations.max(1);
        for attempt in 0..attempts {
            let servable: Vec<String> = self
                .config
                .topics
                .iter()
                .filter(|topic| self.generator.can_generate(topic, &constraints))
                .cloned()
                .collect();
            if servable.is_empty() && !self.config.topics.is_empty() {
                last_reason = "no configured topic has content left".to_string();
                break;
            }
            let Some(topic) = TopicRotation::next(&servable, &recent).map(str::to_string) else {
                break;
            };
            recent.insert(0, topic.clone());
            let started = Utc::now();

            tracing::debug!(
                attempt,
                %topic,
                max_length = constraints.max_length,
                "Requesting candidate"
            );

            let body = match self.generator.generate(&topic, &constraints).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(attempt, %topic, error = %err, "Generation failed");
                    last_topic = topic;
                    last_content = String::new();
                    last_reason = err.to_string();
                    if !err.is_transient() {
                        break;
                    }
                    let more_attempts = attempt + 1 < attempts;
                    if let Some(wait) = err.retry_after().filter(|_| more_attempts) {
                        if Instant::now() + wait > deadline {
                            tracing::warn!(?wait, "Generator asks to wait past the run deadline");
                            break;
                        }
                        tracing::info!(?wait, "Waiting before requesting another candidate");
                        tokio::time::sleep(wait).await;
                    }
                    continue;
                }
            };

            let text = self.filter.compose(&body);
            match self.filter.evaluate(&text, self.store.as_ref())? {
                Verdict::Accepted => {
                    tracing::info!(attempt, %topic, "Candidate accepted");
                    return Ok(Candidate::Accepted { topic, text });
                }
                Verdict::Rejected(rejection) => {
                    let reason = rejection.to_string();
                    tracing::info!(attempt, %topic, %reason, "Candidate rejected");
                    if !self.config.dry_run {
                        self.store
                            .record(&NewPostRecord::rejected(&text, &topic, &reason, started))?;
                    }
                    last_topic = topic;
                    last_content = text;
                    last_reason = reason;
                }
            }
        }

        Ok(Candidate::Exhausted {
            topic: last_topic,
            content: last_content,
            reason: last_reason,
        })
    }
}
