//! Error types for the llm crate.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by language model providers.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Provider '{provider}' is not configured (set {env_var})")]
    NotConfigured {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("No provider supports model '{model}'")]
    ModelNotSupported { model: String },

    #[error("Request to {provider} failed: {reason}")]
    Request {
        provider: &'static str,
        reason: String,
    },

    #[error("Request to {provider} timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} rate limit exceeded")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Failed to parse {provider} response: {reason}")]
    Parse {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} returned an empty completion")]
    EmptyResponse { provider: &'static str },
}

impl LlmError {
    /// Build a request error from a `reqwest` failure.
    pub(crate) fn from_reqwest(provider: &'static str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { provider }
        } else {
            Self::Request {
                provider,
                reason: err.to_string(),
            }
        }
    }

    /// Whether retrying the same request later could succeed.
    ///
    /// Network failures, timeouts, rate limits and server-side errors are
    /// transient. Auth failures, bad requests and unparseable responses are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotConfigured { .. }
            | Self::ModelNotSupported { .. }
            | Self::Parse { .. }
            | Self::EmptyResponse { .. } => false,
        }
    }
}

/// Result type alias for provider operations
pub type LlmResult<T> = Result<T, LlmError>;
