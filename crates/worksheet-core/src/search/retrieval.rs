//! Hybrid retrieval: vector seeds plus one hop over shared tags

use std::collections::HashSet;
use std::sync::Arc;

use super::config::SearchBehaviorConfig;
use super::embedding::EmbeddingProvider;
use super::error::{SearchError, SearchResult};
use super::types::{augment_query, MatchType, SearchHit, SearchOptions, SearchResults};
use super::vector_index::SharedIndex;
use crate::{Page, PageStore};

/// Resolves a query (and optional tag) into ranked pages.
///
/// Results come in two tiers: pages the vector index returns directly, then
/// pages sharing at least one tag with one of those. Within a tier the order
/// is seed order, then store order.
pub struct Retriever {
    store: PageStore,
    index: Arc<SharedIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    behavior: SearchBehaviorConfig,
}

impl Retriever {
    pub fn new(
        store: PageStore,
        index: Arc<SharedIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        behavior: SearchBehaviorConfig,
    ) -> Self {
        Self {
            store,
            index,
            provider,
            behavior,
        }
    }

    /// The text that gets embedded for `query`
    pub fn embedded_query(&self, query: &str) -> String {
        augment_query(query, &self.behavior.audience_keyword, &self.behavior.query_context)
    }

    pub async fn search(&self, query: &str, tag_filter: Option<&str>) -> SearchResult<Vec<SearchHit>> {
        let mut options = SearchOptions::new(query);
        options.tag = tag_filter.map(str::to_string);
        Ok(self.search_with(&options).await?.results)
    }

    pub async fn search_with(&self, options: &SearchOptions) -> SearchResult<SearchResults> {
        let embedded_query = self.embedded_query(&options.query);
        let tag_filter = options.tag_filter();

        let query_vector = self
            .provider
            .embed(&embedded_query)
            .await
            .map_err(|e| SearchError::QueryEmbedding(e.to_string()))?;

        let seeds = self
            .index
            .search(&query_vector, self.behavior.seed_count)
            .map_err(|e| SearchError::QueryEmbedding(e.to_string()))?;

        // Distances only decide which pages seed the search; every seed
        // ranks the same.
        let mut seed_pages = Vec::with_capacity(seeds.len());
        for (page_id, _distance) in seeds {
            // The page may have been removed since the index was read.
            if let Some(page) = self.store.get(page_id)? {
                seed_pages.push(page);
            }
        }

        let mut visited: HashSet<i64> = HashSet::new();
        let mut hits = Vec::new();

        for page in &seed_pages {
            if visited.contains(&page.id) || !passes_filter(page, tag_filter.as_deref()) {
                continue;
            }
            hits.push(SearchHit::from_page(page, self.behavior.direct_score, MatchType::Direct, None));
            visited.insert(page.id);
        }

        // One full scan per tagged seed: O(pages x seeds), fine for a
        // single-tenant corpus. A tag -> page id map would replace the scan.
        let tagged_seeds: Vec<&Page> = seed_pages.iter().filter(|p| !p.tags.is_empty()).collect();
        if !tagged_seeds.is_empty() {
            let candidates = self.store.list_all()?;
            for seed in tagged_seeds {
                for candidate in &candidates {
                    if !expands_from(seed, candidate, &visited, tag_filter.as_deref()) {
                        continue;
                    }
                    hits.push(SearchHit::from_page(
                        candidate,
                        self.behavior.expansion_score,
                        MatchType::TagExpansion,
                        Some(seed.id),
                    ));
                    visited.insert(candidate.id);
                }
            }
        }

        // Stable: equal scores keep emission order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        log::debug!(
            "[Retriever] \"{}\" -> {} results ({} seeds)",
            embedded_query,
            hits.len(),
            seed_pages.len()
        );

        Ok(SearchResults {
            query: options.query.clone(),
            embedded_query,
            count: hits.len(),
            results: hits,
        })
    }
}

fn passes_filter(page: &Page, tag_filter: Option<&str>) -> bool {
    tag_filter.map_or(true, |tag| page.tags.contains(tag))
}

fn expands_from(seed: &Page, candidate: &Page, visited: &HashSet<i64>, tag_filter: Option<&str>) -> bool {
    candidate.id != seed.id
        && !visited.contains(&candidate.id)
        && candidate.has_embedding()
        && passes_filter(candidate, tag_filter)
        && seed.tags.intersects(&candidate.tags)
}
