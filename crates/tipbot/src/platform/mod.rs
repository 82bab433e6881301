//! Social platform abstraction.
//!
//! The pipeline only needs three things from a platform: publish a post, look
//! for a post it may have published, and check credentials. Failures carry a
//! [`PlatformErrorKind`] that the retry controller acts on.

mod oauth;
mod twitter;

pub use oauth::{OAuthSigner, TwitterCredentials};
pub use twitter::TwitterClient;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proof that a post was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub platform_post_id: String,
    pub posted_at: DateTime<Utc>,
}

/// How a platform failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// Worth retrying: timeouts, connect failures, 5xx, 429.
    Transient,
    /// Retrying cannot help: auth failures, rejected content, other 4xx.
    Permanent,
    /// The request may or may not have taken effect.
    Ambiguous,
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Ambiguous => "ambiguous",
        })
    }
}

/// A classified platform failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} platform error: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
    /// Platform-supplied delay before the next attempt.
    pub retry_after: Option<Duration>,
}

impl PlatformError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: PlatformErrorKind::Transient,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: PlatformErrorKind::Permanent,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self {
            kind: PlatformErrorKind::Ambiguous,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// A social platform the bot can publish to.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Publish `text`.
    async fn post(&self, text: &str) -> Result<PostReceipt, PlatformError>;

    /// Find a recent post by the authenticated account whose normalized text
    /// matches `text`. Used to settle ambiguous outcomes.
    async fn find_recent_post(&self, _text: &str) -> Result<Option<PostReceipt>, PlatformError> {
        Ok(None)
    }

    /// Check credentials and return the account handle.
    async fn verify_credentials(&self) -> Result<String, PlatformError>;
}

/// Stand-in used by dry runs when no credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

#[async_trait]
impl Platform for Unconfigured {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn post(&self, _text: &str) -> Result<PostReceipt, PlatformError> {
        Err(PlatformError::permanent("platform credentials are not configured"))
    }

    async fn verify_credentials(&self) -> Result<String, PlatformError> {
        Err(PlatformError::permanent("platform credentials are not configured"))
    }
}
