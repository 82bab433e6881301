//! Topic rotation.

/// Picks the least recently used topic.
pub struct TopicRotation;

impl TopicRotation {
    /// The configured topic that appears latest in `recent` (newest first), or
    /// never. Ties go to configuration order.
    pub fn next<'a>(topics: &'a [String], recent: &[String]) -> Option<&'a str> {
        topics
            .iter()
            .filter(|t| !t.trim().is_empty())
            .enumerate()
            .max_by_key(|(index, topic)| {
                let last_used = recent.iter().position(|r| r == *topic).unwrap_or(usize::MAX);
                // Larger is staler; earlier config position wins ties.
                (last_used, std::cmp::Reverse(*index))
            })
            .map(|(_, topic)| topic.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Vec<String> {
        ["Python", "Rust", "Go"].iter().map(ToString::to_string).collect()
    }

    fn recent(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_unused_topics_first_in_config_order() {
        assert_eq!(TopicRotation::next(&topics(), &[]), Some("Python"));
        assert_eq!(TopicRotation::next(&topics(), &recent(&["Python"])), Some("Rust"));
    }

    #[test]
    fn test_least_recently_used() {
        let recent = recent(&["Go", "Python", "Rust", "Go"]);
        assert_eq!(TopicRotation::next(&topics(), &recent), Some("Rust"));
    }

    #[test]
    fn test_unknown_recent_topics_are_ignored() {
        let recent = recent(&["Haskell", "Python", "Rust"]);
        assert_eq!(TopicRotation::next(&topics(), &recent), Some("Go"));
    }

    #[test]
    fn test_no_topics() {
        assert_eq!(TopicRotation::next(&[], &[]), None);
    }
}
