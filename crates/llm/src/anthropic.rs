//! Anthropic Claude AI provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{LlmError, LlmResult};

use super::provider::{
    status_error, AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage,
};

const PROVIDER: &str = "anthropic";

/// Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Supported Anthropic models
const SUPPORTED_MODELS: &[&str] = &[
    // Claude 4.5 models
    "claude-opus-4-5-20251101",
    "claude-sonnet-4-5-20250929",
    // Short names for convenience
    "opus",
    "sonnet",
    "haiku",
    // Claude 4 models
    "claude-opus-4-1-20250805",
    "claude-sonnet-4-20250514",
    // Claude 3 models
    "claude-3-5-haiku-20241022",
    "claude-3-haiku-20240307",
];

/// Normalize model name to the canonical API model name.
fn normalize_model(model: &str) -> &str {
    match model {
        "opus" => "claude-opus-4-5-20251101",
        "sonnet" => "claude-sonnet-4-5-20250929",
        "haiku" => "claude-3-5-haiku-20241022",
        _ => model,
    }
}

/// Anthropic API request message
#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic API request
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

/// Anthropic API response content
#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API usage
#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic API response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
}

/// Anthropic API error
#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Convert messages to Anthropic format, extracting system message.
    fn convert_messages(&self, messages: &[AIMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                AIRole::System => {
                    // Anthropic uses a separate system field
                    system = Some(msg.content.clone());
                }
                AIRole::User => {
                    converted.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: msg.content.clone(),
                    });
                }
                AIRole::Assistant => {
                    converted.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: msg.content.clone(),
                    });
                }
            }
        }

        (system, converted)
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn api_key_env_var(&self) -> &'static str {
        "ANTHROPIC_API_KEY"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supported_models(&self) -> Vec<&str> {
        SUPPORTED_MODELS.to_vec()
    }

    async fn generate_text(
        &self,
        model: &str,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> LlmResult<AIResponse> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured {
            provider: PROVIDER,
            env_var: "ANTHROPIC_API_KEY",
        })?;

        let (system, converted_messages) = self.convert_messages(messages);

        let request = AnthropicRequest {
            model: normalize_model(model).to_string(),
            messages: converted_messages,
            max_tokens: options.max_tokens.unwrap_or(1024),
            system,
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.clone(),
        };

        tracing::debug!(model = %request.model, "Calling Claude API");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, &e))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<AnthropicErrorResponse>(&body) {
                Ok(error_response) => format!(
                    "{} - {}",
                    error_response.error.error_type, error_response.error.message
                ),
                Err(_) => body,
            };
            return Err(status_error(PROVIDER, status, &headers, message));
        }

        let api_response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        let text: String = api_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }

        tracing::debug!(
            input_tokens = api_response.usage.input_tokens,
            output_tokens = api_response.usage.output_tokens,
            "Claude API call complete"
        );

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            },
            model: api_response.model,
            provider: PROVIDER.to_string(),
        })
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Get the default Anthropic model.
pub fn default_model() -> &'static str {
    DEFAULT_MODEL
}
