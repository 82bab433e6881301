//! Provider Registry - Manages AI provider instances.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Client;

use crate::errors::{LlmError, LlmResult};

use super::anthropic::AnthropicProvider;
use super::openai::OpenAIProvider;
use super::provider::AIProvider;

/// Registry of AI providers, keyed by provider name.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn AIProvider>>>,
}

impl ProviderRegistry {
    /// Create an empty provider registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the default providers, configured from the environment.
    pub fn with_defaults() -> Self {
        Self::with_http_client(&Client::new())
    }

    /// Create a registry with the default providers sharing one HTTP client.
    pub fn with_http_client(client: &Client) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(
            AnthropicProvider::from_env().with_http_client(client.clone()),
        ));
        registry.register(Arc::new(
            OpenAIProvider::from_env().with_http_client(client.clone()),
        ));
        registry
    }

    /// Register a provider.
    pub fn register(&self, provider: Arc<dyn AIProvider>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(provider.name().to_string(), provider);
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AIProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.get(name).cloned()
    }

    /// Get a provider that supports a specific model.
    pub fn get_for_model(&self, model: &str) -> Option<Arc<dyn AIProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers
            .values()
            .find(|p| p.supports_model(model))
            .cloned()
    }

    /// Get all registered provider names.
    pub fn provider_names(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// Get a configured provider for a model, or explain why there is none.
    pub fn require_for_model(&self, model: &str) -> LlmResult<Arc<dyn AIProvider>> {
        let provider = self
            .get_for_model(model)
            .ok_or_else(|| LlmError::ModelNotSupported {
                model: model.to_string(),
            })?;

        if !provider.is_configured() {
            return Err(LlmError::NotConfigured {
                provider: provider.name(),
                env_var: provider.api_key_env_var(),
            });
        }

        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = ProviderRegistry::new();
        assert!(registry.provider_names().is_empty());
    }

    #[test]
    fn test_lookup_by_model() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(AnthropicProvider::new("a")));
        registry.register(Arc::new(OpenAIProvider::new("o")));

        assert_eq!(
            registry.get_for_model("gpt-4o-mini").map(|p| p.name()),
            Some("openai")
        );
        assert_eq!(
            registry.get_for_model("sonnet").map(|p| p.name()),
            Some("anthropic")
        );
        assert!(registry.get("anthropic").is_some());
    }

    #[test]
    fn test_require_for_unknown_model() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(OpenAIProvider::new("o")));

        let err = registry.require_for_model("llama-3").err().unwrap();
        assert!(matches!(err, LlmError::ModelNotSupported { .. }));
    }
}
