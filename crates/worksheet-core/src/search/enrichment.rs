//! AI enrichment results: cleaned text / captions plus suggested tags
//!
//! Language and vision models are asked to answer with a small JSON object,
//! often wrapped in a markdown code fence. Anything that does not parse is
//! kept as raw text instead of being dropped.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::error::SearchResult;
use crate::{Page, TagSet};

/// Outcome of one enrichment call
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Structured answer
    Parsed { summary: String, tags: TagSet },
    /// The model answered, but not in the expected shape
    Unparsed { raw_text: String },
}

impl EnrichmentOutcome {
    /// Parse a model reply. Replies without a usable JSON object become
    /// [`EnrichmentOutcome::Unparsed`].
    pub fn from_response(content: &str) -> Self {
        let body = strip_code_fence(content.trim());
        match serde_json::from_str::<EnrichmentPayload>(body) {
            Ok(payload) => match payload.summary() {
                Some(summary) => EnrichmentOutcome::Parsed {
                    summary,
                    tags: payload.tags.map(RawTags::into_tag_set).unwrap_or_default(),
                },
                None => EnrichmentOutcome::Unparsed {
                    raw_text: content.trim().to_string(),
                },
            },
            Err(_) => EnrichmentOutcome::Unparsed {
                raw_text: content.trim().to_string(),
            },
        }
    }

    /// Summary and tags to apply. Unparsed replies use the raw text as the
    /// summary and contribute no tags.
    pub fn into_parts(self) -> (String, TagSet) {
        match self {
            EnrichmentOutcome::Parsed { summary, tags } => (summary, tags),
            EnrichmentOutcome::Unparsed { raw_text } => (raw_text, TagSet::new()),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, EnrichmentOutcome::Parsed { .. })
    }
}

#[derive(Debug, Deserialize)]
struct EnrichmentPayload {
    #[serde(default)]
    cleaned_text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Option<RawTags>,
}

impl EnrichmentPayload {
    fn summary(&self) -> Option<String> {
        self.cleaned_text
            .as_deref()
            .or(self.summary.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Models return tags either as `"a, b"` or `["a", "b"]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    Joined(String),
    List(Vec<String>),
}

impl RawTags {
    fn into_tag_set(self) -> TagSet {
        match self {
            RawTags::Joined(raw) => TagSet::parse(&raw),
            RawTags::List(list) => TagSet::from_tags(list),
        }
    }
}

fn strip_code_fence(content: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid fence regex")
    });
    fence
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
}

/// Cleans raw extracted text and suggests tags
#[async_trait]
pub trait TextEnricher: Send + Sync {
    async fn enrich(&self, raw_text: &str) -> SearchResult<EnrichmentOutcome>;
}

/// Describes image-heavy pages (vision model)
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, page: &Page) -> SearchResult<EnrichmentOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json() {
        let reply = "```json\n{\"cleaned_text\": \"Add the apples.\", \"tags\": \"Addition, counting\"}\n```";
        let outcome = EnrichmentOutcome::from_response(reply);
        assert_eq!(
            outcome,
            EnrichmentOutcome::Parsed {
                summary: "Add the apples.".into(),
                tags: TagSet::parse("addition, counting"),
            }
        );
    }

    #[test]
    fn test_parses_plain_json_with_tag_list() {
        let reply = r#"{"summary": "Trace the triangle.", "tags": ["Shapes", " tracing "]}"#;
        let (summary, tags) = EnrichmentOutcome::from_response(reply).into_parts();
        assert_eq!(summary, "Trace the triangle.");
        assert_eq!(tags.to_store_string(), "shapes, tracing");
    }

    #[test]
    fn test_unparsed_falls_back_to_raw_text() {
        let reply = "A worksheet showing three cats and a number line.";
        let outcome = EnrichmentOutcome::from_response(reply);
        assert!(!outcome.is_parsed());
        let (summary, tags) = outcome.into_parts();
        assert_eq!(summary, reply);
        assert!(tags.is_empty());
    }

    #[test]
    fn test_json_without_text_is_unparsed() {
        let outcome = EnrichmentOutcome::from_response(r#"{"tags": "a"}"#);
        assert!(matches!(outcome, EnrichmentOutcome::Unparsed { .. }));
    }
}
