//! OpenAI GPT provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{LlmError, LlmResult};

use super::provider::{
    status_error, AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage,
};

const PROVIDER: &str = "openai";

/// OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model
const DEFAULT_MODEL: &str = "gpt-4o";

/// Supported OpenAI models
const SUPPORTED_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4"];

/// OpenAI API request message
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

/// OpenAI API request
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

/// OpenAI API response choice message
#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    content: Option<String>,
}

/// OpenAI API response choice
#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

/// OpenAI API usage
#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API response
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    model: String,
    usage: OpenAIUsage,
}

/// OpenAI API error
#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

/// OpenAI API error response
#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

/// OpenAI GPT provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Set a custom base URL (useful for Azure OpenAI or proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Convert messages to OpenAI format.
    fn convert_messages(&self, messages: &[AIMessage]) -> Vec<OpenAIMessage> {
        messages
            .iter()
            .map(|msg| OpenAIMessage {
                role: match msg.role {
                    AIRole::System => "system".to_string(),
                    AIRole::User => "user".to_string(),
                    AIRole::Assistant => "assistant".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn api_key_env_var(&self) -> &'static str {
        "OPENAI_API_KEY"
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
            env_var: "OPENAI_API_KEY",
        })?;

        let request = OpenAIRequest {
            model: model.to_string(),
            messages: self.convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop_sequences.clone(),
        };

        tracing::debug!(model, "Calling OpenAI API");

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
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
            let message = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
                Ok(error_response) => error_response.error.message,
                Err(_) => body,
            };
            return Err(status_error(PROVIDER, status, &headers, message));
        }

        let api_response: OpenAIResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        // Extract text from first choice
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: api_response.usage.prompt_tokens,
                output_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            model: api_response.model,
            provider: PROVIDER.to_string(),
        })
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Get the default OpenAI model.
pub fn default_model() -> &'static str {
    DEFAULT_MODEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_supported_models() {
        let provider = OpenAIProvider::new("key");
        assert!(provider.supports_model("gpt-4o"));
        assert!(!provider.supports_model("claude-3-haiku-20240307"));
    }

    #[test]
    fn test_message_conversion() {
        let provider = OpenAIProvider::new("key");
        let messages = vec![AIMessage::system("sys"), AIMessage::user("Hello")];

        let converted = provider.convert_messages(&messages);

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
    }

    #[tokio::test]
    async fn test_generate_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Use EXPLAIN before adding an index."}}],
                "model": "gpt-4o",
                "usage": {"prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21}
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let response = provider
            .generate_text("gpt-4o", &[AIMessage::user("tip")], &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.text, "Use EXPLAIN before adding an index.");
        assert_eq!(response.usage.total_tokens, 21);
    }

    #[tokio::test]
    async fn test_generate_text_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(serde_json::json!({"error": {"message": "slow down"}})),
            )
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let err = provider
            .generate_text("gpt-4o", &[AIMessage::user("tip")], &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after: Some(d),
                ..
            } if d.as_secs() == 7
        ));
    }

    #[tokio::test]
    async fn test_generate_text_empty_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": null}}],
                "model": "gpt-4o",
                "usage": {"prompt_tokens": 1, "completion_tokens": 0, "total_tokens": 1}
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let err = provider
            .generate_text("gpt-4o", &[AIMessage::user("tip")], &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
