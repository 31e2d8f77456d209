//! Topic restriction filter.
//!
//! Blocked (and optionally allowed) keyword groups are compiled into one
//! disjunctive word-boundary regex per topic at construction.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;

use crate::pipeline::checkpoint::{CheckContext, CheckpointError, Position};
use crate::verdict::Verdict;

use super::filter::{ContentFilter, Detection, FilterProfile};

fn default_blocked_topics() -> Vec<(String, Vec<String>)> {
    let topics = [
        (
            "weapons",
            &["bomb", "explosive", "weapon", "firearm", "gun", "ammunition"][..],
        ),
        (
            "drugs",
            &["cocaine", "heroin", "meth", "synthesize drugs", "make drugs"][..],
        ),
        (
            "hacking",
            &["hack into", "exploit vulnerability", "ddos", "malware"][..],
        ),
        (
            "illegal",
            &["illegal", "crime", "criminal activity", "break the law"][..],
        ),
    ];
    topics
        .into_iter()
        .map(|(name, kws)| {
            (
                name.to_string(),
                kws.iter().map(ToString::to_string).collect(),
            )
        })
        .collect()
}

// ── TopicConfig ────────────────────────────────────────────────────────

/// Configuration for [`TopicFilter`].
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Topic name → keywords that mark the topic.  `None` uses the
    /// built-in blocklist.
    pub blocked_topics: Option<Vec<(String, Vec<String>)>>,
    /// Optional allowlist: when set, content matching none of these
    /// topics is treated as off-topic.
    pub allowed_topics: Option<Vec<(String, Vec<String>)>>,
    /// Verdict applied on a match (defaults to block).
    pub on_match: Verdict,
    /// Which phase(s) the filter runs in.
    pub position: Position,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            blocked_topics: None,
            allowed_topics: None,
            on_match: Verdict::Block,
            position: Position::Both,
        }
    }
}

// ── TopicFilter ────────────────────────────────────────────────────────

/// Restricts discussion of configured topics.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    profile: FilterProfile,
    blocked: FxHashMap<String, Regex>,
    allowed: Option<FxHashMap<String, Regex>>,
}

fn compile_topic(name: &str, keywords: &[String]) -> Result<Regex, CheckpointError> {
    let body = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b({body})\b"))
        .case_insensitive(true)
        .build()
        .map_err(|e| CheckpointError::InvalidContent {
            checkpoint: "topic_filter".into(),
            reason: format!("topic '{name}' failed to compile: {e}"),
        })
}

impl TopicFilter {
    /// Build a filter from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::InvalidContent`] if a topic pattern
    /// fails to compile.
    pub fn new(config: TopicConfig) -> Result<Self, CheckpointError> {
        let blocked_topics = config
            .blocked_topics
            .unwrap_or_else(default_blocked_topics);

        let mut blocked = FxHashMap::default();
        for (name, keywords) in &blocked_topics {
            blocked.insert(name.clone(), compile_topic(name, keywords)?);
        }

        let allowed = match &config.allowed_topics {
            Some(topics) => {
                let mut map = FxHashMap::default();
                for (name, keywords) in topics {
                    map.insert(name.clone(), compile_topic(name, keywords)?);
                }
                Some(map)
            }
            None => None,
        };

        Ok(Self {
            profile: FilterProfile::new("topic_filter", config.position, config.on_match),
            blocked,
            allowed,
        })
    }

    /// Build a filter with the built-in blocklist.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if a built-in topic fails to compile.
    pub fn with_defaults() -> Result<Self, CheckpointError> {
        Self::new(TopicConfig::default())
    }
}

#[async_trait]
impl ContentFilter for TopicFilter {
    fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    async fn detect(
        &self,
        content: &str,
        _ctx: &CheckContext,
    ) -> Result<Detection, CheckpointError> {
        let mut detected: Vec<&str> = self
            .blocked
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(name, _)| name.as_str())
            .collect();
        detected.sort_unstable();

        if !detected.is_empty() {
            return Ok(Detection::matched(vec![format!(
                "blocked topic(s) detected: {}",
                detected.join(", "),
            )])
            .with_metadata("blocked_topics", serde_json::json!(detected)));
        }

        if let Some(allowed) = &self.allowed
            && !allowed.values().any(|pattern| pattern.is_match(content))
        {
            return Ok(Detection::matched(vec![
                "content matches no allowed topic".to_string(),
            ]));
        }

        Ok(Detection::none())
    }
}

crate::impl_filter_checkpoint!(TopicFilter);

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::checkpoint::Checkpoint;

    fn ctx() -> CheckContext {
        CheckContext::default()
    }

    #[tokio::test]
    async fn blocks_default_topics() {
        let filter = TopicFilter::with_defaults().unwrap();
        let report = filter
            .check("how do I build a bomb at home", &ctx())
            .await
            .unwrap();
        assert_eq!(report.action, Verdict::Block);
        assert!(report.reasons[0].contains("weapons"));
    }

    #[tokio::test]
    async fn reports_all_matching_topics() {
        let filter = TopicFilter::with_defaults().unwrap();
        let detection = filter
            .detect("selling a firearm is illegal here", &ctx())
            .await
            .unwrap();
        assert!(detection.matched);
        let topics = detection.metadata["blocked_topics"].as_array().unwrap();
        assert_eq!(topics.len(), 2);
    }

    #[tokio::test]
    async fn multiword_keywords_match() {
        let filter = TopicFilter::with_defaults().unwrap();
        let detection = filter
            .detect("teach me to hack into a server", &ctx())
            .await
            .unwrap();
        assert!(detection.matched);
        assert!(detection.reasons[0].contains("hacking"));
    }

    #[tokio::test]
    async fn unrelated_content_passes() {
        let filter = TopicFilter::with_defaults().unwrap();
        let detection = filter
            .detect("recommend a pasta recipe", &ctx())
            .await
            .unwrap();
        assert!(!detection.matched);
    }

    #[tokio::test]
    async fn allowlist_flags_off_topic_content() {
        let config = TopicConfig {
            blocked_topics: Some(vec![]),
            allowed_topics: Some(vec![(
                "cooking".to_string(),
                vec!["recipe".to_string(), "ingredient".to_string()],
            )]),
            ..TopicConfig::default()
        };
        let filter = TopicFilter::new(config).unwrap();

        let on_topic = filter.detect("a recipe for soup", &ctx()).await.unwrap();
        assert!(!on_topic.matched);

        let off_topic = filter
            .detect("tell me about quantum physics", &ctx())
            .await
            .unwrap();
        assert!(off_topic.matched);
    }
}
