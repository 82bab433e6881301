//! Bot configuration loaded from `tipbot.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Secrets never live here; they come from the
//! environment (see [`crate::platform::TwitterCredentials`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ConfigResult};
use crate::quota::QuotaPolicy;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tipbot.toml";

/// Topics posted about when the config does not list its own.
pub const DEFAULT_TOPICS: &[&str] = &[
    "Python programming",
    "JavaScript best practices",
    "Software architecture",
    "Clean code principles",
    "Web development",
    "API design",
    "DevOps practices",
    "Database optimization",
    "Security best practices",
    "Code testing strategies",
];

/// Terms rejected by the content filter unless overridden.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "spam", "abuse", "hack", "crack", "illegal", "malware", "virus", "exploit", "nsfw", "scam",
    "fraud",
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Topics rotated through, least recently used first.
    pub topics: Vec<String>,
    /// SQLite database holding the post history.
    pub database_path: PathBuf,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout_secs: u64,
    pub generator: GeneratorConfig,
    pub content: ContentConfig,
    pub quota: QuotaConfig,
    pub retry: RetryConfig,
    pub platform: PlatformConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(ToString::to_string).collect(),
            database_path: PathBuf::from("data/tipbot.db"),
            request_timeout_secs: 30,
            generator: GeneratorConfig::default(),
            content: ContentConfig::default(),
            quota: QuotaConfig::default(),
            retry: RetryConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

/// Where candidate text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Language model via the `llm` crate.
    Llm,
    /// Offline tip catalog.
    Catalog,
}

/// Candidate generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    /// Model identifier, resolved to a provider through the registry.
    pub model: String,
    /// Sampling temperature passed to the model.
    pub temperature: f32,
    /// Token cap for a single completion.
    pub max_tokens: u32,
    /// Writing style hint rendered into the prompt.
    pub style: String,
    /// Handlebars template replacing the built-in prompt.
    pub prompt_template: Option<String>,
    /// TOML catalog replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Fresh candidates requested per run before giving up.
    pub max_regenerations: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Llm,
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.7,
            max_tokens: 300,
            style: "concise and informative".to_string(),
            prompt_template: None,
            catalog_path: None,
            max_regenerations: 3,
        }
    }
}

/// Content filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Appended to every candidate before filtering and posting.
    pub hashtags: String,
    /// Weighted character limit of a post.
    pub character_limit: usize,
    pub min_length: usize,
    /// A word of 4+ characters may appear at most this many times.
    pub max_word_repeats: usize,
    /// Whole-word, case-insensitive terms.
    pub denylist_terms: Vec<String>,
    /// Regular expressions matched anywhere in the text.
    pub denylist_patterns: Vec<String>,
    /// Extra terms, one per line; `#` starts a comment.
    pub denylist_file: Option<PathBuf>,
    /// Reject text whose word sentiment falls below this score (-1.0 to 1.0).
    pub min_sentiment: Option<f64>,
    /// Reject text whose readability index exceeds this value.
    pub max_readability: Option<f64>,
    /// Reject text whose sentence lengths vary at least this much.
    pub max_sentence_variance: Option<f64>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            hashtags: "#coding #programming #tech".to_string(),
            character_limit: 280,
            min_length: 10,
            max_word_repeats: 3,
            denylist_terms: DEFAULT_DENYLIST.iter().map(ToString::to_string).collect(),
            denylist_patterns: Vec::new(),
            denylist_file: None,
            min_sentiment: None,
            max_readability: None,
            max_sentence_variance: None,
        }
    }
}

/// A rolling window limit, e.g. at most 5 posts per 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub span_secs: u64,
    pub max_posts: u32,
}

/// Posting quota settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Successful posts allowed per UTC day.
    pub max_per_day: u32,
    /// Fraction of `max_per_day` actually used, in (0, 1].
    pub rate_limit_buffer: f64,
    /// Minimum spacing between two successful posts.
    pub min_interval_secs: u64,
    pub windows: Vec<WindowConfig>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_per_day: 50,
            rate_limit_buffer: 1.0,
            min_interval_secs: 1800,
            windows: Vec::new(),
        }
    }
}

impl QuotaConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

/// Platform retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Wall-clock budget for one run, from quota check to the final record.
    pub run_deadline_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 2,
            max_delay_secs: 60,
            run_deadline_secs: 300,
        }
    }
}

impl RetryConfig {
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }
}

/// Social platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// X API base URL.
    pub api_base_url: String,
    /// Recent posts scanned when confirming an ambiguous post.
    pub lookup_limit: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.twitter.com".to_string(),
            lookup_limit: 10,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `tipbot.toml` in the working
    /// directory is used when present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        let config = config.with_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without validating it.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `TIPBOT_DATABASE`, `TIPBOT_MODEL` and `TIPBOT_GENERATOR` overrides.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("TIPBOT_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(model) = lookup("TIPBOT_MODEL") {
            self.generator.model = model;
        }
        match lookup("TIPBOT_GENERATOR").as_deref() {
            Some("llm") => self.generator.backend = GeneratorBackend::Llm,
            Some("catalog") => self.generator.backend = GeneratorBackend::Catalog,
            Some(other) => {
                tracing::warn!(value = other, "Ignoring unknown TIPBOT_GENERATOR value");
            }
            None => {}
        }
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::invalid("topics", "at least one topic is required"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be positive"));
        }
        if self.generator.max_regenerations == 0 {
            return Err(ConfigError::invalid(
                "generator.max_regenerations",
                "must be at least 1",
            ));
        }
        if self.generator.model.trim().is_empty() {
            return Err(ConfigError::invalid("generator.model", "must not be empty"));
        }

        let content = &self.content;
        if content.character_limit == 0 {
            return Err(ConfigError::invalid("content.character_limit", "must be positive"));
        }
        if content.min_length > content.character_limit {
            return Err(ConfigError::invalid(
                "content.min_length",
                format!("exceeds character_limit ({})", content.character_limit),
            ));
        }
        if content.max_word_repeats == 0 {
            return Err(ConfigError::invalid("content.max_word_repeats", "must be positive"));
        }
        for (field, value) in [
            ("content.min_sentiment", content.min_sentiment),
            ("content.max_readability", content.max_readability),
            ("content.max_sentence_variance", content.max_sentence_variance),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ConfigError::invalid(field, "must be a finite number"));
            }
        }
        for pattern in &content.denylist_patterns {
            Regex::new(pattern).map_err(|e| {
                ConfigError::invalid("content.denylist_patterns", format!("{pattern}: {e}"))
            })?;
        }

        let quota = &self.quota;
        if quota.max_per_day == 0 {
            return Err(ConfigError::invalid("quota.max_per_day", "must be positive"));
        }
        if !(quota.rate_limit_buffer > 0.0 && quota.rate_limit_buffer <= 1.0) {
            return Err(ConfigError::invalid(
                "quota.rate_limit_buffer",
                "must be in (0, 1]",
            ));
        }
        if QuotaPolicy::from_config(quota).effective_daily_cap() == 0 {
            return Err(ConfigError::invalid(
                "quota.rate_limit_buffer",
                "leaves an effective daily cap of zero",
            ));
        }
        for window in &quota.windows {
            if window.span_secs == 0 || window.max_posts == 0 {
                return Err(ConfigError::invalid(
                    "quota.windows",
                    "span_secs and max_posts must be positive",
                ));
            }
        }

        let retry = &self.retry;
        if retry.base_delay_secs > retry.max_delay_secs {
            return Err(ConfigError::invalid(
                "retry.base_delay_secs",
                format!("exceeds max_delay_secs ({})", retry.max_delay_secs),
            ));
        }
        if retry.run_deadline_secs == 0 {
            return Err(ConfigError::invalid("retry.run_deadline_secs", "must be positive"));
        }

        if self.platform.lookup_limit < 5 || self.platform.lookup_limit > 100 {
            return Err(ConfigError::invalid(
                "platform.lookup_limit",
                "must be between 5 and 100",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.topics.len(), 10);
        assert_eq!(config.quota.max_per_day, 50);
        assert_eq!(config.generator.max_regenerations, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
topics = ["Rust ownership"]

[quota]
max_per_day = 5
rate_limit_buffer = 0.9

[[quota.windows]]
span_secs = 900
max_posts = 2

[generator]
backend = "catalog"
"#,
        )
        .unwrap();

        assert_eq!(config.topics, vec!["Rust ownership".to_string()]);
        assert_eq!(config.quota.max_per_day, 5);
        assert_eq!(QuotaPolicy::from_config(&config.quota).effective_daily_cap(), 4);
        assert_eq!(config.quota.windows.len(), 1);
        assert_eq!(config.quota.min_interval_secs, 1800);
        assert_eq!(config.generator.backend, GeneratorBackend::Catalog);
        assert_eq!(config.content.character_limit, 280);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let err = Config::from_toml("[generator]\nbackend = \"markov\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.topics = vec!["  ".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "topics"
        ));

        let mut config = Config::default();
        config.quota.rate_limit_buffer = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.max_per_day = 1;
        config.quota.rate_limit_buffer = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.base_delay_secs = 120;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.content.denylist_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "content.denylist_patterns"
        ));

        let mut config = Config::default();
        config.content.max_readability = Some(f64::NAN);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "content.max_readability"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(|name| match name {
            "TIPBOT_DATABASE" => Some("/tmp/other.db".to_string()),
            "TIPBOT_GENERATOR" => Some("catalog".to_string()),
            _ => None,
        });

        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.generator.backend, GeneratorBackend::Catalog);
        assert_eq!(config.generator.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/tipbot.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_example_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tipbot.example.toml");
        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.quota.windows.len(), 1);
        assert_eq!(QuotaPolicy::from_config(&config.quota).effective_daily_cap(), 45);
    }
}
