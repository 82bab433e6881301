//! Posting quota derived from the history store.
//!
//! There is no in-memory counter: every check recomputes the counts from
//! persisted `success` records, so restarts and overlapping runs see the same
//! state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use crate::config::QuotaConfig;
use crate::errors::StorageResult;
use crate::history::HistoryStore;

/// Why posting is not allowed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    DailyCapReached { cap: u32 },
    WindowCapReached { span: Duration, max_posts: u32 },
    TooSoon { min_interval: Duration },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyCapReached { cap } => write!(f, "DailyCapReached ({cap} per day)"),
            Self::WindowCapReached { span, max_posts } => write!(
                f,
                "WindowCapReached ({max_posts} per {}s)",
                span.as_secs()
            ),
            Self::TooSoon { min_interval } => {
                write!(f, "TooSoon (minimum interval {}s)", min_interval.as_secs())
            }
        }
    }
}

/// Outcome of a quota check. A denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied {
        reason: DenyReason,
        /// Earliest time the same check could pass.
        retry_after: DateTime<Utc>,
    },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A rolling window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    pub span: Duration,
    pub max_posts: u32,
}

/// Quota limits.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaPolicy {
    pub max_per_day: u32,
    pub rate_limit_buffer: f64,
    pub windows: Vec<RollingWindow>,
    pub min_interval: Duration,
}

impl QuotaPolicy {
    pub fn from_config(config: &QuotaConfig) -> Self {
        Self {
            max_per_day: config.max_per_day,
            rate_limit_buffer: config.rate_limit_buffer,
            windows: config
                .windows
                .iter()
                .map(|w| RollingWindow {
                    span: Duration::from_secs(w.span_secs),
                    max_posts: w.max_posts,
                })
                .collect(),
            min_interval: config.min_interval(),
        }
    }

    /// `floor(max_per_day × rate_limit_buffer)`
    pub fn effective_daily_cap(&self) -> u32 {
        (f64::from(self.max_per_day) * self.rate_limit_buffer).floor() as u32
    }
}

/// Answers "may we post now?" from history alone.
pub struct QuotaGuard {
    store: Arc<dyn HistoryStore>,
    policy: QuotaPolicy,
}

impl QuotaGuard {
    pub fn new(store: Arc<dyn HistoryStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub fn may_post_now(&self) -> StorageResult<QuotaDecision> {
        self.check_at(Utc::now())
    }

    /// Evaluate the policy at `now`: daily cap, rolling windows, then spacing.
    pub fn check_at(&self, now: DateTime<Utc>) -> StorageResult<QuotaDecision> {
        let day_start = start_of_day(now);
        let cap = self.policy.effective_daily_cap();
        let today = self.store.count_since(day_start)?;
        if today >= cap {
            return Ok(QuotaDecision::Denied {
                reason: DenyReason::DailyCapReached { cap },
                retry_after: day_start + TimeDelta::days(1),
            });
        }

        for window in &self.policy.windows {
            let span = to_delta(window.span);
            let since = now - span;
            let in_window = self.store.successes_since(since)?;
            let count = in_window.len();
            let max_posts = window.max_posts as usize;
            if count >= max_posts {
                // A slot frees up once enough of the oldest posts age out. A
                // window allowing no posts never frees one; wait a full span.
                let freeing = in_window.get(count - max_posts).copied().unwrap_or(now);
                return Ok(QuotaDecision::Denied {
                    reason: DenyReason::WindowCapReached {
                        span: window.span,
                        max_posts: window.max_posts,
                    },
                    retry_after: freeing + span,
                });
            }
        }

        if let Some(last) = self.store.last_success()? {
            let min_interval = to_delta(self.policy.min_interval);
            let next = last.created_at + min_interval;
            if now < next {
                return Ok(QuotaDecision::Denied {
                    reason: DenyReason::TooSoon {
                        min_interval: self.policy.min_interval,
                    },
                    retry_after: next,
                });
            }
        }

        Ok(QuotaDecision::Allowed)
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::days(365 * 100))
}
