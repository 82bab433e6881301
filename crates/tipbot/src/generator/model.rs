//! Language-model backed generator.

use std::sync::Arc;

use async_trait::async_trait;
use llm::{AIMessage, AIProvider, GenerateOptions};

use super::prompts::{PromptManager, TipPromptData, SYSTEM_PROMPT};
use super::{Constraints, ContentGenerator, GenerationError};

/// Labels models like to prefix their answer with.
const LEADING_LABELS: &[&str] = &["tweet:", "tip:", "post:"];

/// Generates tips through an [`AIProvider`].
pub struct LlmGenerator {
    provider: Arc<dyn AIProvider>,
    model: String,
    prompts: PromptManager,
    style: String,
    options: GenerateOptions,
}

impl LlmGenerator {
    pub fn new(
        provider: Arc<dyn AIProvider>,
        model: impl Into<String>,
        prompts: PromptManager,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            prompts,
            style: "concise and informative".to_string(),
            options: GenerateOptions::default(),
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn generate(
        &self,
        topic: &str,
        constraints: &Constraints,
    ) -> Result<String, GenerationError> {
        let prompt = self.prompts.render_tip(&TipPromptData {
            topic,
            max_length: constraints.max_length,
            style: &self.style,
        })?;
        let messages = [AIMessage::system(SYSTEM_PROMPT), AIMessage::user(prompt)];

        let response = self
            .provider
            .generate_text(&self.model, &messages, &self.options)
            .await?;

        tracing::debug!(
            provider = %response.provider,
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            "Generated candidate"
        );

        Ok(sanitize(&response.text))
    }
}

/// Strip the wrapping models tend to add around a tip.
pub fn sanitize(text: &str) -> String {
    let mut current = text.trim();

    loop {
        let before = current;

        for label in LEADING_LABELS {
            if current.len() >= label.len()
                && current.is_char_boundary(label.len())
                && current[..label.len()].eq_ignore_ascii_case(label)
            {
                current = current[label.len()..].trim_start();
            }
        }

        for (open, close) in [
            ("```", "```"),
            ("\"", "\""),
            ("'", "'"),
            ("“", "”"),
            ("`", "`"),
        ] {
            if current.len() >= open.len() + close.len()
                && current.starts_with(open)
                && current.ends_with(close)
            {
                current = current[open.len()..current.len() - close.len()].trim();
            }
        }

        if current == before {
            return current.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{AIResponse, LlmError, LlmResult, TokenUsage};
    use std::sync::Mutex;

    struct FakeProvider {
        reply: LlmResult<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AIProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn api_key_env_var(&self) -> &'static str {
            "FAKE_API_KEY"
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn supported_models(&self) -> Vec<&str> {
            vec!["fake-model"]
        }

        async fn generate_text(
            &self,
            _model: &str,
            messages: &[AIMessage],
            _options: &GenerateOptions,
        ) -> LlmResult<AIResponse> {
            self.prompts
                .lock()
                .unwrap()
                .extend(messages.iter().map(|m| m.content.clone()));
            self.reply.clone().map(|text| AIResponse {
                text,
                usage: TokenUsage::default(),
                model: "fake-model".to_string(),
                provider: "fake".to_string(),
            })
        }
    }

    fn build(reply: LlmResult<String>) -> (Arc<FakeProvider>, LlmGenerator) {
        let provider = Arc::new(FakeProvider {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        let generator =
            LlmGenerator::new(provider.clone(), "fake-model", PromptManager::new().unwrap());
        (provider, generator)
    }

    #[tokio::test]
    async fn test_generate_renders_prompt_and_sanitizes() {
        let reply = "Tweet: \"Use EXPLAIN ANALYZE to see real query plans.\"";
        let (provider, generator) = build(Ok(reply.to_string()));

        let text = generator
            .generate("Database optimization", &Constraints { max_length: 253 })
            .await
            .unwrap();

        assert_eq!(text, "Use EXPLAIN ANALYZE to see real query plans.");
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts[0], SYSTEM_PROMPT);
        assert!(prompts[1].contains("Database optimization"));
        assert!(prompts[1].contains("253"));
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let (_, generator) = build(Err(LlmError::RateLimited {
            provider: "fake",
            retry_after: None,
        }));
        let err = generator
            .generate("Rust", &Constraints { max_length: 200 })
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let (_, generator) = build(Err(LlmError::Api {
            provider: "fake",
            status: 400,
            message: "bad request".to_string(),
        }));
        let err = generator
            .generate("Rust", &Constraints { max_length: 200 })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  plain tip  "), "plain tip");
        assert_eq!(sanitize("\"quoted tip\""), "quoted tip");
        assert_eq!(sanitize("“curly quoted”"), "curly quoted");
        assert_eq!(sanitize("```\nfenced tip\n```"), "fenced tip");
        assert_eq!(sanitize("TWEET: 'nested label'"), "nested label");
        assert_eq!(sanitize("Tip: `code` is inline"), "`code` is inline");
        assert_eq!(sanitize("Don't strip \"inner\" quotes"), "Don't strip \"inner\" quotes");
        assert_eq!(sanitize("\""), "\"");
    }
}
