//! Tag normalization and aggregation
//!
//! Tags are modeled as a real set everywhere inside the crate. The
//! comma-joined form only exists at the store boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag that marks pages whose text was too thin to embed.
pub const IMAGE_HEAVY_TAG: &str = "image-heavy";

/// A normalized, deduplicated set of tags.
///
/// Every member is trimmed, lowercase and non-empty. Iteration order is
/// the set's sorted order, which is also the order used for storage and
/// for the embedding tag annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated tag string: split, trim, lowercase, drop
    /// empty segments, collapse duplicates.
    pub fn parse(raw: &str) -> Self {
        raw.split(',').filter_map(normalize_tag).collect()
    }

    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter()
            .filter_map(|t| normalize_tag(t.as_ref()))
            .collect()
    }

    /// Insert a tag, normalizing it first. Returns false for empty tags or
    /// tags already present.
    pub fn insert(&mut self, tag: &str) -> bool {
        match normalize_tag(tag) {
            Some(tag) => self.0.insert(tag),
            None => false,
        }
    }

    pub fn extend_from(&mut self, other: &TagSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, tag: &str) -> bool {
        normalize_tag(tag).is_some_and(|t| self.0.contains(&t))
    }

    pub fn intersects(&self, other: &TagSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|t| large.0.contains(t))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Storage form: `tag1, tag2`.
    pub fn to_store_string(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

impl FromIterator<String> for TagSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<String> for TagSet {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<TagSet> for String {
    fn from(tags: TagSet) -> Self {
        tags.to_store_string()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_store_string())
    }
}

/// Trim + lowercase a single tag. `None` when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Union of every tag set, in case-insensitive alphabetical order.
pub fn aggregate_tags<'a, I>(sets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TagSet>,
{
    let mut all: BTreeSet<&str> = BTreeSet::new();
    for set in sets {
        all.extend(set.iter());
    }
    let mut tags: Vec<String> = all.into_iter().map(str::to_string).collect();
    tags.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    tags
}

/// A tag with the number of pages carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Most used tags first; equal counts fall back to alphabetical order.
pub fn count_tags<'a, I>(sets: I, limit: usize) -> Vec<TagCount>
where
    I: IntoIterator<Item = &'a TagSet>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for set in sets {
        for tag in set.iter() {
            *counts.entry(tag).or_default() += 1;
        }
    }
    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    // BTreeMap already yields alphabetical order, and sort_by is stable.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}

/// Folder components of a source path, used as tags. The file name and any
/// segment containing a '.' are skipped.
pub fn folder_tags(source_name: &str) -> TagSet {
    let normalized = source_name.replace('\\', "/");
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    TagSet::from_tags(segments.into_iter().filter(|s| !s.contains('.')))
}
