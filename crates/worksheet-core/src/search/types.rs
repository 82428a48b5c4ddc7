//! Common types for search module

use serde::{Deserialize, Serialize};

use crate::{Page, TagSet};

/// How a result was reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Returned by the vector index
    Direct,
    /// Shares a tag with a direct hit
    TagExpansion,
}

/// Search request as received from the HTTP layer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchOptions {
    /// Free-text query
    pub query: String,
    /// Only return pages carrying this tag
    #[serde(default)]
    pub tag: Option<String>,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Normalized tag filter, `None` when absent or blank
    pub fn tag_filter(&self) -> Option<String> {
        self.tag.as_deref().and_then(crate::tags::normalize_tag)
    }
}

/// A single search result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub page_id: i64,
    pub text: String,
    pub source_name: String,
    pub page_number: u32,
    /// Comma-joined tag string
    pub tags: String,
    pub score: f32,
    pub matched_by: MatchType,
    /// Seed page that led to a tag-expansion hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_page: Option<i64>,
}

impl SearchHit {
    pub(crate) fn from_page(page: &Page, score: f32, matched_by: MatchType, via_page: Option<i64>) -> Self {
        Self {
            page_id: page.id,
            text: page.text.clone(),
            source_name: page.source_name.clone(),
            page_number: page.page_number,
            tags: page.tags.to_store_string(),
            score,
            matched_by,
            via_page,
        }
    }
}

/// Search results response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// The original query
    pub query: String,
    /// Text actually sent to the embedding provider
    pub embedded_query: String,
    pub results: Vec<SearchHit>,
    pub count: usize,
}

/// Index/store consistency snapshot
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct IndexStats {
    /// Vectors currently in the index
    pub indexed: usize,
    /// Pages in the store
    pub pages: usize,
    /// Pages in the store that carry an embedding
    pub embedded_pages: usize,
}

impl IndexStats {
    pub fn is_consistent(&self) -> bool {
        self.indexed == self.embedded_pages
    }
}

/// Build the text that gets embedded for a page: its text, the derived
/// summary when present, then a `[tags: ..]` annotation.
pub fn embedding_input(text: &str, derived_summary: Option<&str>, tags: &TagSet) -> String {
    let mut input = text.to_string();
    if let Some(summary) = derived_summary.map(str::trim).filter(|s| !s.is_empty()) {
        input.push('\n');
        input.push_str(summary);
    }
    if !tags.is_empty() {
        input.push_str("\n[tags: ");
        input.push_str(&tags.iter().collect::<Vec<_>>().join(", "));
        input.push(']');
    }
    input
}

/// `true` when the embedding input has enough content to be worth embedding
pub fn is_embeddable(input: &str, min_chars: usize) -> bool {
    input.trim().chars().count() > min_chars
}

/// Append the audience context unless the query already names it
pub fn augment_query(query: &str, audience_keyword: &str, context: &str) -> String {
    if query.to_lowercase().contains(&audience_keyword.to_lowercase()) {
        query.to_string()
    } else {
        format!("{query}{context}")
    }
}
