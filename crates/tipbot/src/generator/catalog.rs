//! Offline tip catalog.
//!
//! A catalog is a TOML document mapping topics to hand-written tips:
//!
//! ```toml
//! emoji = "🔥"
//!
//! [topics."Python programming"]
//! emoji = "🐍"
//! tips = ["Use enumerate() instead of range(len(...)) when you need the index."]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;

use super::{Constraints, ContentGenerator, GenerationError};
use crate::errors::{ConfigError, ConfigResult};
use crate::filter::ContentFilter;
use crate::history::{content_hash, HistoryStore};

const BUILTIN_CATALOG: &str = include_str!("../../data/tips.toml");

fn default_emoji() -> String {
    "🔥".to_string()
}

/// Tips grouped by topic.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_emoji")]
    emoji: String,
    #[serde(default)]
    topics: BTreeMap<String, TopicTips>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopicTips {
    emoji: Option<String>,
    #[serde(default)]
    tips: Vec<String>,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> ConfigResult<Self> {
        Self::from_toml(BUILTIN_CATALOG, "<builtin>")
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    pub fn from_toml(content: &str, source: &str) -> ConfigResult<Self> {
        let mut catalog: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

        for entry in catalog.topics.values_mut() {
            entry.tips.retain(|tip| !tip.trim().is_empty());
        }
        catalog.topics.retain(|_, entry| !entry.tips.is_empty());

        if catalog.topics.is_empty() {
            return Err(ConfigError::Parse {
                path: source.to_string(),
                reason: "catalog contains no tips".to_string(),
            });
        }
        Ok(catalog)
    }

    /// Topics that have at least one tip.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn tips(&self, topic: &str) -> Option<&[String]> {
        self.topics.get(topic).map(|entry| entry.tips.as_slice())
    }

    fn emoji_for(&self, topic: &str) -> &str {
        self.topics
            .get(topic)
            .and_then(|entry| entry.emoji.as_deref())
            .unwrap_or(&self.emoji)
    }

    /// Render a tip the way it is posted.
    pub fn format(&self, topic: &str, tip: &str) -> String {
        format!("{} {topic} Tip:\n\n{}", self.emoji_for(topic), tip.trim())
    }
}

/// Serves tips from a [`Catalog`] without any network access.
///
/// Each topic is walked in order starting at `offset`, so consecutive runs
/// given consecutive offsets start on different tips. Within one generator a
/// tip is never returned twice, and with [`CatalogGenerator::with_history`]
/// tips already posted are skipped as well.
pub struct CatalogGenerator {
    catalog: Catalog,
    offset: usize,
    returned: Mutex<HashSet<String>>,
    history: Option<PostedTips>,
}

/// Posted content, compared the way the filter composes it.
struct PostedTips {
    store: Arc<dyn HistoryStore>,
    filter: ContentFilter,
}

impl PostedTips {
    fn contains(&self, text: &str) -> bool {
        match self.store.is_duplicate(&self.filter.compose(text)) {
            Ok(posted) => posted,
            Err(e) => {
                // The filter repeats the lookup and surfaces the error.
                tracing::warn!(error = %e, "Could not check catalog tip against history");
                false
            }
        }
    }
}

impl CatalogGenerator {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            offset: 0,
            returned: Mutex::new(HashSet::new()),
            history: None,
        }
    }

    /// Start each topic's walk at `offset` (wrapped to the topic's tip count).
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Skip tips whose composed text is already in `store`.
    pub fn with_history(mut self, store: Arc<dyn HistoryStore>, filter: ContentFilter) -> Self {
        self.history = Some(PostedTips { store, filter });
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn returned(&self) -> Result<MutexGuard<'_, HashSet<String>>, GenerationError> {
        self.returned
            .lock()
            .map_err(|_| GenerationError::Permanent("catalog state poisoned".to_string()))
    }

    /// First usable tip for `topic`, formatted.
    fn next_tip(
        &self,
        topic: &str,
        constraints: &Constraints,
        returned: &HashSet<String>,
    ) -> Option<String> {
        let tips = self.catalog.tips(topic)?;
        (0..tips.len())
            .map(|step| self.catalog.format(topic, &tips[(self.offset + step) % tips.len()]))
            .find(|text| {
                if text.chars().count() > constraints.max_length {
                    tracing::debug!(topic, "Skipping catalog tip over length budget");
                    return false;
                }
                !returned.contains(&content_hash(text))
                    && !self.history.as_ref().is_some_and(|h| h.contains(text))
            })
    }
}

#[async_trait]
impl ContentGenerator for CatalogGenerator {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn can_generate(&self, topic: &str, constraints: &Constraints) -> bool {
        match self.returned() {
            Ok(returned) => self.next_tip(topic, constraints, &returned).is_some(),
            Err(_) => false,
        }
    }

    async fn generate(
        &self,
        topic: &str,
        constraints: &Constraints,
    ) -> Result<String, GenerationError> {
        if self.catalog.tips(topic).is_none() {
            return Err(GenerationError::Permanent(format!(
                "no catalog tips for topic '{topic}'"
            )));
        }

        let mut returned = self.returned()?;
        let text = self
            .next_tip(topic, constraints, &returned)
            .ok_or_else(|| {
                GenerationError::Permanent(format!("catalog has no unused tip for topic '{topic}'"))
            })?;
        returned.insert(content_hash(&text));
        Ok(text)
    }
}
