//! Candidate text generation.

mod catalog;
mod model;
mod prompts;
mod topics;

pub use catalog::{Catalog, CatalogGenerator};
pub use model::{sanitize, LlmGenerator};
pub use prompts::PromptManager;
pub use topics::TopicRotation;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Limits the generated body must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    /// Maximum characters of the body, before the hashtag suffix.
    pub max_length: usize,
}

/// Generation failures, split by whether asking again could help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("transient generation failure: {message}")]
    Transient {
        message: String,
        /// How long the backend asked us to wait before trying again.
        retry_after: Option<Duration>,
    },

    #[error("permanent generation failure: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Permanent(_) => None,
        }
    }
}

impl From<llm::LlmError> for GenerationError {
    fn from(err: llm::LlmError) -> Self {
        if err.is_transient() {
            let retry_after = match &err {
                llm::LlmError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            };
            Self::Transient {
                message: err.to_string(),
                retry_after,
            }
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

/// Produces candidate post bodies for a topic.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether `topic` can still produce a candidate. Topics that cannot are
    /// left out of rotation.
    fn can_generate(&self, _topic: &str, _constraints: &Constraints) -> bool {
        true
    }

    async fn generate(
        &self,
        topic: &str,
        constraints: &Constraints,
    ) -> Result<String, GenerationError>;
}
