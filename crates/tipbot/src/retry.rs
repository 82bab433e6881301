//! Retry policy and controller for platform calls.
//!
//! [`RetryPolicy::decide`] is a pure function of the attempt number and the
//! classified error. [`RetryController`] drives the calls, sleeps, enforces the
//! run deadline and settles ambiguous outcomes through
//! [`Platform::find_recent_post`].

use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};

use crate::config::RetryConfig;
use crate::platform::{Platform, PlatformError, PlatformErrorKind, PostReceipt};

/// Upper bound for the lookup that settles an ambiguous post. Applied on its
/// own because the run deadline may already be spent.
const AMBIGUITY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Exponential backoff limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Why the policy stopped retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Permanent,
    Ambiguous,
    Exhausted,
    HintExceedsCap { hint: Duration },
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp(StopReason),
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// `min(base × 2^attempt, max_delay)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Longest total sleep a single post may incur.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.backoff(attempt))
        })
    }

    /// Decide what follows the failure of the zero-based `attempt`.
    pub fn decide(&self, attempt: u32, error: &PlatformError) -> RetryDecision {
        match error.kind {
            PlatformErrorKind::Permanent => RetryDecision::GiveUp(StopReason::Permanent),
            PlatformErrorKind::Ambiguous => RetryDecision::GiveUp(StopReason::Ambiguous),
            PlatformErrorKind::Transient if attempt >= self.max_retries => {
                RetryDecision::GiveUp(StopReason::Exhausted)
            }
            PlatformErrorKind::Transient => match error.retry_after {
                Some(hint) if hint > self.max_delay => {
                    RetryDecision::GiveUp(StopReason::HintExceedsCap { hint })
                }
                Some(hint) => RetryDecision::Retry { delay: hint },
                None => RetryDecision::Retry {
                    delay: self.backoff(attempt),
                },
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// A post that could not be published. The display form is what ends up in
/// the history record's `error_message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostFailure {
    #[error("Permanent: {0}")]
    Permanent(PlatformError),

    #[error("RetriesExhausted: {last}")]
    RetriesExhausted { last: PlatformError },

    #[error("Ambiguous: {last}")]
    Ambiguous { last: PlatformError },

    #[error("DeadlineExceeded: {}", describe_last(.last))]
    DeadlineExceeded { last: Option<PlatformError> },

    #[error("RetryHintTooLong: asked to wait {}s: {last}", .hint.as_secs())]
    RetryHintTooLong { hint: Duration, last: PlatformError },
}

fn describe_last(last: &Option<PlatformError>) -> String {
    last.as_ref().map_or_else(|| "no attempt completed".to_string(), ToString::to_string)
}

impl PostFailure {
    /// The last platform error seen, if any attempt completed.
    pub fn last_error(&self) -> Option<&PlatformError> {
        match self {
            Self::Permanent(last)
            | Self::RetriesExhausted { last }
            | Self::Ambiguous { last }
            | Self::RetryHintTooLong { last, .. } => Some(last),
            Self::DeadlineExceeded { last } => last.as_ref(),
        }
    }
}

/// Result of driving one post through the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted { receipt: PostReceipt, attempts: u32 },
    Failed { error: PostFailure, attempts: u32 },
}

impl PostOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Posted { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Drives platform calls under a [`RetryPolicy`] and a run deadline.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    run_deadline: Duration,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, run_deadline: Duration) -> Self {
        Self {
            policy,
            run_deadline,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Post `text` with a deadline of `run_deadline` from now.
    pub async fn execute(&self, platform: &dyn Platform, text: &str) -> PostOutcome {
        self.execute_until(platform, text, Instant::now() + self.run_deadline)
            .await
    }

    /// Post `text`, giving up once `deadline` passes.
    pub async fn execute_until(
        &self,
        platform: &dyn Platform,
        text: &str,
        deadline: Instant,
    ) -> PostOutcome {
        let budget = self.policy.max_total_delay();
        let mut slept = Duration::ZERO;
        let mut attempts = 0u32;
        let mut last: Option<PlatformError> = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(attempts, "Run deadline reached before the next attempt");
                return PostOutcome::Failed {
                    error: PostFailure::DeadlineExceeded { last },
                    attempts,
                };
            }

            let attempt = attempts;
            attempts += 1;
            tracing::debug!(platform = platform.name(), attempt, "Posting");

            let error = match timeout(deadline - now, platform.post(text)).await {
                Ok(Ok(receipt)) => {
                    tracing::info!(
                        platform_post_id = %receipt.platform_post_id,
                        attempts,
                        "Post published"
                    );
                    return PostOutcome::Posted { receipt, attempts };
                }
                Ok(Err(error)) => error,
                Err(_) => {
                    PlatformError::ambiguous("run deadline reached while the post was in flight")
                }
            };

            tracing::warn!(
                attempt,
                kind = %error.kind,
                error = %error.message,
                "Post attempt failed"
            );

            let delay = match self.policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::GiveUp(StopReason::Ambiguous) => {
                    return self.settle_ambiguous(platform, text, error, attempts).await;
                }
                RetryDecision::GiveUp(StopReason::Permanent) => {
                    return PostOutcome::Failed {
                        error: PostFailure::Permanent(error),
                        attempts,
                    };
                }
                RetryDecision::GiveUp(StopReason::Exhausted) => {
                    return PostOutcome::Failed {
                        error: PostFailure::RetriesExhausted { last: error },
                        attempts,
                    };
                }
                RetryDecision::GiveUp(StopReason::HintExceedsCap { hint }) => {
                    return PostOutcome::Failed {
                        error: PostFailure::RetryHintTooLong { hint, last: error },
                        attempts,
                    };
                }
            };

            // Platform hints may be longer than the backoff they replace.
            if delay > budget.saturating_sub(slept) {
                return PostOutcome::Failed {
                    error: PostFailure::RetryHintTooLong { hint: delay, last: error },
                    attempts,
                };
            }
            if Instant::now() + delay >= deadline {
                tracing::warn!(
                    attempts,
                    delay_secs = delay.as_secs(),
                    "Backoff would pass the run deadline"
                );
                return PostOutcome::Failed {
                    error: PostFailure::DeadlineExceeded { last: Some(error) },
                    attempts,
                };
            }

            tracing::info!(delay_ms = delay.as_millis() as u64, "Retrying post");
            sleep(delay).await;
            slept += delay;
            last = Some(error);
        }
    }

    async fn settle_ambiguous(
        &self,
        platform: &dyn Platform,
        text: &str,
        error: PlatformError,
        attempts: u32,
    ) -> PostOutcome {
        tracing::warn!("Post outcome unknown, looking for it on the platform");

        match timeout(AMBIGUITY_LOOKUP_TIMEOUT, platform.find_recent_post(text)).await {
            Ok(Ok(Some(receipt))) => {
                tracing::info!(
                    platform_post_id = %receipt.platform_post_id,
                    "Ambiguous post confirmed on the platform"
                );
                return PostOutcome::Posted { receipt, attempts };
            }
            Ok(Ok(None)) => tracing::warn!("Ambiguous post not found on the platform"),
            Ok(Err(lookup)) => tracing::warn!(error = %lookup, "Ambiguous post lookup failed"),
            Err(_) => tracing::warn!("Ambiguous post lookup timed out"),
        }

        PostOutcome::Failed {
            error: PostFailure::Ambiguous { last: error },
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
        assert_eq!(policy.max_total_delay(), Duration::from_secs(11));
    }

    #[test]
    fn test_transient_retries_until_max() {
        let policy = policy();
        let err = PlatformError::transient("HTTP 503");
        assert_eq!(
            policy.decide(0, &err),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.decide(2, &err),
            RetryDecision::Retry {
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(policy.decide(3, &err), RetryDecision::GiveUp(StopReason::Exhausted));
    }

    #[test]
    fn test_platform_hint_replaces_backoff() {
        let policy = policy();
        let hinted =
            PlatformError::transient("HTTP 429").with_retry_after(Some(Duration::from_secs(3)));
        assert_eq!(
            policy.decide(0, &hinted),
            RetryDecision::Retry {
                delay: Duration::from_secs(3)
            }
        );

        let too_long =
            PlatformError::transient("HTTP 429").with_retry_after(Some(Duration::from_secs(900)));
        assert_eq!(
            policy.decide(0, &too_long),
            RetryDecision::GiveUp(StopReason::HintExceedsCap {
                hint: Duration::from_secs(900)
            })
        );
    }

    #[test]
    fn test_permanent_and_ambiguous_stop_immediately() {
        let policy = policy();
        assert_eq!(
            policy.decide(0, &PlatformError::permanent("HTTP 401")),
            RetryDecision::GiveUp(StopReason::Permanent)
        );
        assert_eq!(
            policy.decide(0, &PlatformError::ambiguous("connection reset")),
            RetryDecision::GiveUp(StopReason::Ambiguous)
        );
    }

    #[test]
    fn test_failure_messages() {
        let last = PlatformError::transient("HTTP 503");
        assert_eq!(
            PostFailure::RetriesExhausted { last: last.clone() }.to_string(),
            "RetriesExhausted: transient platform error: HTTP 503"
        );
        assert_eq!(
            PostFailure::DeadlineExceeded { last: None }.to_string(),
            "DeadlineExceeded: no attempt completed"
        );
        let hint = PostFailure::RetryHintTooLong {
            hint: Duration::from_secs(900),
            last,
        };
        assert!(hint.to_string().starts_with("RetryHintTooLong: asked to wait 900s"));
        assert_eq!(hint.last_error().map(|e| e.kind), Some(PlatformErrorKind::Transient));
    }
}
