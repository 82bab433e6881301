//! Candidate validation before posting.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::ContentConfig;
use crate::errors::{ConfigError, ConfigResult, StorageResult};
use crate::history::HistoryStore;

/// Weight of any URL, matching the platform's link shortener.
pub const URL_WEIGHT: usize = 23;

/// Shortest word counted by the repetition check.
const MIN_REPEAT_WORD_LEN: usize = 4;

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "awesome", "excellent", "best", "improve", "efficient", "optimize",
    "helpful", "useful", "powerful", "simple", "clean", "fast", "reliable", "robust", "secure",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "worst", "poor", "avoid", "complex", "difficult", "problem", "issue", "bug", "error",
    "crash", "slow", "complicated", "unreliable", "insecure", "vulnerable",
];

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid URL regex"));

/// Why a candidate was refused. The `Display` text is what gets stored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Empty: candidate is blank")]
    Empty,

    #[error("TooShort: {length} characters, minimum is {min}")]
    TooShort { length: usize, min: usize },

    #[error("TooLong: weighted length {length} exceeds limit of {max}")]
    TooLong { length: usize, max: usize },

    #[error("Inappropriate: matched denylist entry '{term}'")]
    Inappropriate { term: String },

    #[error("Repetitive: '{word}' appears {count} times")]
    Repetitive { word: String, count: usize },

    #[error("Negative: sentiment {score:.2} is below {min:.2}")]
    Negative { score: f64, min: f64 },

    #[error("HardToRead: readability {score:.1} exceeds {max:.1}")]
    HardToRead { score: f64, max: f64 },

    #[error("UnevenSentences: sentence length variance {variance:.0} reaches {max:.0}")]
    UnevenSentences { variance: f64, max: f64 },

    #[error("Duplicate: identical content was already posted")]
    Duplicate,
}

/// Result of evaluating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

/// Content checks followed by a novelty check against the history.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    hashtags: String,
    character_limit: usize,
    min_length: usize,
    max_word_repeats: usize,
    terms: Vec<(String, Regex)>,
    patterns: Vec<Regex>,
    min_sentiment: Option<f64>,
    max_readability: Option<f64>,
    max_sentence_variance: Option<f64>,
}

impl ContentFilter {
    /// Build the filter, reading the denylist file when one is configured.
    pub fn from_config(config: &ContentConfig) -> ConfigResult<Self> {
        let mut terms = config.denylist_terms.clone();
        if let Some(path) = &config.denylist_file {
            terms.extend(read_denylist(path)?);
        }

        let terms = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|term| {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&term))).map_err(|e| {
                    ConfigError::invalid("content.denylist_terms", format!("{term}: {e}"))
                })?;
                Ok((term, re))
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let patterns = config
            .denylist_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ConfigError::invalid("content.denylist_patterns", format!("{p}: {e}"))
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            hashtags: config.hashtags.trim().to_string(),
            character_limit: config.character_limit,
            min_length: config.min_length,
            max_word_repeats: config.max_word_repeats,
            terms,
            patterns,
            min_sentiment: config.min_sentiment,
            max_readability: config.max_readability,
            max_sentence_variance: config.max_sentence_variance,
        })
    }

    /// Append the hashtag suffix to a generated body.
    ///
    /// A blank body composes to an empty string so it is rejected as `Empty`.
    pub fn compose(&self, body: &str) -> String {
        let body = body.trim();
        if body.is_empty() {
            String::new()
        } else if self.hashtags.is_empty() {
            body.to_string()
        } else {
            format!("{body} {}", self.hashtags)
        }
    }

    /// Room left for the generated body once the suffix is appended.
    pub fn body_budget(&self) -> usize {
        if self.hashtags.is_empty() {
            self.character_limit
        } else {
            self.character_limit
                .saturating_sub(weighted_length(&self.hashtags) + 1)
        }
    }

    /// Run every check in order; the first failure wins.
    pub fn evaluate(&self, text: &str, history: &dyn HistoryStore) -> StorageResult<Verdict> {
        if let Some(rejection) = self.check_content(text) {
            return Ok(Verdict::Rejected(rejection));
        }
        if history.is_duplicate(text)? {
            return Ok(Verdict::Rejected(Rejection::Duplicate));
        }
        Ok(Verdict::Accepted)
    }

    /// The checks that need no history.
    pub fn check_content(&self, text: &str) -> Option<Rejection> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(Rejection::Empty);
        }

        let length = trimmed.chars().count();
        if length < self.min_length {
            return Some(Rejection::TooShort {
                length,
                min: self.min_length,
            });
        }

        let weighted = weighted_length(text);
        if weighted > self.character_limit {
            return Some(Rejection::TooLong {
                length: weighted,
                max: self.character_limit,
            });
        }

        if let Some((term, _)) = self.terms.iter().find(|(_, re)| re.is_match(text)) {
            return Some(Rejection::Inappropriate { term: term.clone() });
        }
        if let Some(re) = self.patterns.iter().find(|re| re.is_match(text)) {
            return Some(Rejection::Inappropriate {
                term: re.as_str().to_string(),
            });
        }

        if let Some(rejection) = self.check_repetition(text) {
            return Some(rejection);
        }
        self.check_heuristics(text)
    }

    /// Optional sentiment, readability and sentence-length checks.
    fn check_heuristics(&self, text: &str) -> Option<Rejection> {
        if let Some(min) = self.min_sentiment {
            let score = sentiment_score(text);
            if score < min {
                return Some(Rejection::Negative { score, min });
            }
        }
        if let Some(max) = self.max_readability {
            let score = readability_score(text);
            if score > max {
                return Some(Rejection::HardToRead { score, max });
            }
        }
        if let Some(max) = self.max_sentence_variance {
            let variance = sentence_length_variance(text);
            if variance >= max {
                return Some(Rejection::UnevenSentences { variance, max });
            }
        }
        None
    }

    fn check_repetition(&self, text: &str) -> Option<Rejection> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order = Vec::new();

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= MIN_REPEAT_WORD_LEN)
        {
            let word = word.to_lowercase();
            let count = counts.entry(word.clone()).or_insert(0);
            if *count == 0 {
                order.push(word);
            }
            *count += 1;
        }

        order.into_iter().find_map(|word| {
            let count = counts[&word];
            (count > self.max_word_repeats).then_some(Rejection::Repetitive { word, count })
        })
    }
}

/// Character count with every URL weighted as [`URL_WEIGHT`].
pub fn weighted_length(text: &str) -> usize {
    URL_PATTERN
        .find_iter(text)
        .fold(text.chars().count(), |len, m| {
            len - m.as_str().chars().count() + URL_WEIGHT
        })
}

/// Positive minus negative words, over the word count. Ranges from -1.0 to 1.0.
pub fn sentiment_score(text: &str) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let score: i64 = words
        .iter()
        .map(|w| {
            if POSITIVE_WORDS.contains(&w.as_str()) {
                1
            } else if NEGATIVE_WORDS.contains(&w.as_str()) {
                -1
            } else {
                0
            }
        })
        .sum();
    score as f64 / words.len() as f64
}

/// Readability index from average word length and words per sentence.
/// Higher is harder to read.
pub fn readability_score(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let letters: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_length = letters as f64 / words.len() as f64;
    let sentences = text
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count()
        .max(1);
    4.71 * avg_word_length + 0.5 * (words.len() as f64 / sentences as f64) - 21.43
}

/// Population variance of sentence lengths, splitting on periods.
pub fn sentence_length_variance(text: &str) -> f64 {
    let lengths: Vec<f64> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().count() as f64)
        .collect();
    if lengths.is_empty() {
        return 0.0;
    }
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64
}

fn read_denylist(path: &Path) -> ConfigResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{NewPostRecord, SqliteHistoryStore};
    use chrono::Utc;

    fn filter() -> ContentFilter {
        ContentFilter::from_config(&ContentConfig::default()).unwrap()
    }

    fn empty_store() -> SqliteHistoryStore {
        SqliteHistoryStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_accepts_reasonable_tip() {
        let filter = filter();
        let text = filter.compose("Use list comprehensions for concise Python.");
        assert_eq!(
            text,
            "Use list comprehensions for concise Python. #coding #programming #tech"
        );
        assert_eq!(filter.evaluate(&text, &empty_store()).unwrap(), Verdict::Accepted);
    }

    #[test]
    fn test_blank_body_is_empty() {
        let filter = filter();
        let text = filter.compose("  \n\t ");
        assert_eq!(filter.check_content(&text), Some(Rejection::Empty));
    }

    #[test]
    fn test_too_short() {
        let filter = filter();
        assert_eq!(
            filter.check_content("Use Rust"),
            Some(Rejection::TooShort { length: 8, min: 10 })
        );
    }

    #[test]
    fn test_too_long_counts_chars_not_bytes() {
        let filter = filter();
        // 280 multi-byte characters fit, 281 do not.
        assert_eq!(filter.check_content(&"é".repeat(280)), None);
        assert_eq!(
            filter.check_content(&"é".repeat(281)),
            Some(Rejection::TooLong {
                length: 281,
                max: 280
            })
        );
    }

    #[test]
    fn test_urls_are_weighted() {
        let url = format!("https://example.com/{}", "a".repeat(100));
        assert_eq!(weighted_length(&format!("Read {url}")), 5 + URL_WEIGHT);

        let filter = filter();
        let text = format!("{} {url}", "b".repeat(250));
        assert_eq!(filter.check_content(&text), None);
    }

    #[test]
    fn test_body_budget_accounts_for_suffix() {
        let filter = filter();
        // "#coding #programming #tech" is 26 characters plus a separating space.
        assert_eq!(filter.body_budget(), 280 - 27);
    }

    #[test]
    fn test_denylist_is_whole_word_and_case_insensitive() {
        let filter = filter();
        assert_eq!(
            filter.check_content("Never fall for a SCAM disguised as a library update"),
            Some(Rejection::Inappropriate {
                term: "scam".to_string()
            })
        );
        // "hackathon" and "crackers" contain denylisted words but are not matches.
        assert_eq!(
            filter.check_content("Join a hackathon and bring crackers for the team"),
            None
        );
    }

    #[test]
    fn test_denylist_patterns_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deny.txt");
        std::fs::write(&path, "# extra terms\n\nclickbait\n").unwrap();

        let config = ContentConfig {
            denylist_patterns: vec![r"(?i)free\s+crypto".to_string()],
            denylist_file: Some(path),
            ..ContentConfig::default()
        };
        let filter = ContentFilter::from_config(&config).unwrap();

        assert!(matches!(
            filter.check_content("This clickbait tip changes everything"),
            Some(Rejection::Inappropriate { term }) if term == "clickbait"
        ));
        assert!(matches!(
            filter.check_content("Get FREE   crypto with this one trick"),
            Some(Rejection::Inappropriate { .. })
        ));
    }

    #[test]
    fn test_repetition() {
        let filter = filter();
        assert_eq!(
            filter.check_content("test test test test your code before shipping"),
            Some(Rejection::Repetitive {
                word: "test".to_string(),
                count: 4
            })
        );
        // Short words and three repeats are allowed.
        assert_eq!(
            filter.check_content("a a a a a: Test it, test it, test it before release"),
            None
        );
    }

    fn heuristic_filter() -> ContentFilter {
        ContentFilter::from_config(&ContentConfig {
            min_sentiment: Some(-0.2),
            max_readability: Some(40.0),
            max_sentence_variance: Some(500.0),
            ..ContentConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_heuristics_are_off_by_default() {
        let filter = filter();
        assert_eq!(filter.check_content("Avoid complex code, it is slow and bad."), None);
    }

    #[test]
    fn test_negative_sentiment() {
        assert_eq!(sentiment_score("Avoid complex code, it is slow and bad."), -0.5);
        assert_eq!(sentiment_score("Clean code is fast"), 0.5);

        assert!(matches!(
            heuristic_filter().check_content("Avoid complex code, it is slow and bad."),
            Some(Rejection::Negative { score, .. }) if score == -0.5
        ));
    }

    #[test]
    fn test_hard_to_read() {
        let dense = "Internationalization considerations notwithstanding, microservices \
                     architectures necessitate comprehensive observability instrumentation";
        assert!(readability_score(dense) > 40.0);
        assert!(matches!(
            heuristic_filter().check_content(dense),
            Some(Rejection::HardToRead { .. })
        ));

        assert!(readability_score("Use list comprehensions for concise Python.") < 40.0);
    }

    #[test]
    fn test_uneven_sentences() {
        let uneven = "Ship it. Then write thorough integration tests for every public \
                      endpoint you expose to customers.";
        assert!(sentence_length_variance(uneven) >= 500.0);
        assert!(matches!(
            heuristic_filter().check_content(uneven),
            Some(Rejection::UnevenSentences { .. })
        ));

        let even = "Name things well. Keep functions small. Test edge cases.";
        assert_eq!(heuristic_filter().check_content(even), None);
    }

    #[test]
    fn test_duplicate_delegates_to_history() {
        let filter = filter();
        let store = empty_store();
        let text = filter.compose("Use list comprehensions for concise Python.");
        store
            .record(&NewPostRecord::success(text.clone(), "Python", "1", Utc::now()))
            .unwrap();

        let again = filter.compose("use list comprehensions   for concise python.");
        assert_eq!(
            filter.evaluate(&again, &store).unwrap(),
            Verdict::Rejected(Rejection::Duplicate)
        );
    }

    #[test]
    fn test_content_checks_run_before_dedup() {
        let filter = filter();
        let store = empty_store();
        store
            .record(&NewPostRecord::success("scam alert today", "t", "1", Utc::now()))
            .unwrap();

        assert_eq!(
            filter.evaluate("scam alert today", &store).unwrap(),
            Verdict::Rejected(Rejection::Inappropriate {
                term: "scam".to_string()
            })
        );
    }
}
