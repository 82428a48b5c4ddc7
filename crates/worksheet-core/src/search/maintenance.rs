//! Index maintenance
//!
//! Keeps the vector index equal to `{(page.id, page.embedding)}` over every
//! embedded page in the store. Embedding calls happen first, outside any
//! lock; the store write and the matching index update then run together
//! under the write gate so concurrent mutations of the same page cannot
//! leave the two out of step.

use std::sync::Arc;

use parking_lot::Mutex;

use super::config::SearchBehaviorConfig;
use super::embedding::EmbeddingProvider;
use super::enrichment::{Captioner, EnrichmentOutcome};
use super::error::{SearchError, SearchResult};
use super::types::{embedding_input, is_embeddable, IndexStats};
use super::vector_index::{SharedIndex, VectorIndex};
use crate::{Page, PageStore, TagSet};

pub struct IndexMaintenance {
    store: PageStore,
    index: Arc<SharedIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    behavior: SearchBehaviorConfig,
    /// Serializes store-embedding writes with their index updates
    write_gate: Mutex<()>,
}

impl IndexMaintenance {
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
            write_gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Embed and index a freshly created page.
    pub async fn on_page_created(&self, page: &Page) -> SearchResult<Page> {
        self.reembed(page.id).await
    }

    /// Bring the index in line with `page.embedding`: the old vector goes,
    /// the new one (if any) comes in, atomically for concurrent searches.
    pub fn on_page_embedding_changed(&self, page: &Page) -> SearchResult<()> {
        let _gate = self.write_gate.lock();
        self.sync_index_entry(page.id, page.embedding.as_deref())
    }

    /// Recompute a page's embedding from its current text, summary and tags,
    /// then store and index the result. Provider failures leave the page
    /// without an embedding rather than failing the call.
    ///
    /// If the page changes while its vector is being computed, the stale
    /// vector is discarded and the page is embedded again.
    pub async fn reembed(&self, page_id: i64) -> SearchResult<Page> {
        loop {
            let page = self.store.require(page_id)?;
            let input = page_input(&page);
            let embedding = self.compute_embedding(&page).await;
            if self.commit_embedding(page_id, &input, embedding)? {
                return Ok(self.store.require(page_id)?);
            }
            log::debug!("[IndexMaintenance] Page {} changed while embedding, retrying", page_id);
        }
    }

    /// Replace a page's tags and re-embed it with the new annotation.
    pub async fn update_tags(&self, page_id: i64, raw_tags: &str) -> SearchResult<Page> {
        let tags = TagSet::parse(raw_tags);
        self.store.set_tags(page_id, &tags)?;
        log::debug!("[IndexMaintenance] Page {} tags -> [{}]", page_id, tags);
        self.reembed(page_id).await
    }

    /// Store a caption/summary, merge its tags and re-embed.
    pub async fn apply_caption(&self, page_id: i64, outcome: EnrichmentOutcome) -> SearchResult<Page> {
        let page = self.store.require(page_id)?;
        if !outcome.is_parsed() {
            log::debug!("[IndexMaintenance] Page {} caption was not structured, keeping raw text", page_id);
        }
        let (summary, extra_tags) = outcome.into_parts();
        let summary = summary.trim();
        self.store
            .set_derived_summary(page_id, Some(summary).filter(|s| !s.is_empty()))?;
        if !extra_tags.is_empty() {
            let mut tags = page.tags;
            tags.extend_from(&extra_tags);
            self.store.set_tags(page_id, &tags)?;
        }
        self.reembed(page_id).await
    }

    /// Ask `captioner` about a page and apply the answer. A failed caption
    /// call leaves the page as it was.
    pub async fn caption_page(&self, page_id: i64, captioner: &dyn Captioner) -> SearchResult<Page> {
        let page = self.store.require(page_id)?;
        match captioner.caption(&page).await {
            Ok(outcome) => self.apply_caption(page_id, outcome).await,
            Err(e) => {
                log::warn!("[IndexMaintenance] Captioning page {} failed: {}", page_id, e);
                Ok(page)
            }
        }
    }

    /// Embed every page that has none yet (e.g. after provider outages).
    /// Returns how many pages gained an embedding.
    pub async fn embed_missing(&self) -> SearchResult<usize> {
        let mut embedded = 0;
        for page in self.store.list_by_filter(|p| !p.has_embedding())? {
            if self.reembed(page.id).await?.has_embedding() {
                embedded += 1;
            }
        }
        log::info!("[IndexMaintenance] Embedded {} previously missing pages", embedded);
        Ok(embedded)
    }

    /// Rebuild the index from `pages` in iteration order and swap it in as a
    /// whole. Stored vectors of the wrong size are dropped from the store.
    pub fn rebuild_all(&self, pages: &[Page]) -> SearchResult<usize> {
        let _gate = self.write_gate.lock();
        self.rebuild_locked(pages)
    }

    /// Rebuild from the store's current contents (process start).
    pub fn rebuild_from_store(&self) -> SearchResult<usize> {
        let _gate = self.write_gate.lock();
        let pages = self.store.list_all()?;
        self.rebuild_locked(&pages)
    }

    /// Resynchronize after the corpus was reset out from under the index.
    pub fn on_corpus_reset(&self) -> SearchResult<usize> {
        self.rebuild_from_store()
    }

    /// Delete every page and empty the index in one step.
    pub fn reset_corpus(&self) -> SearchResult<usize> {
        let _gate = self.write_gate.lock();
        let removed = self.store.reset()?;
        let pages = self.store.list_all()?;
        self.rebuild_locked(&pages)?;
        log::info!("[IndexMaintenance] Corpus reset, {} pages removed", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> SearchResult<IndexStats> {
        let _gate = self.write_gate.lock();
        let pages = self.store.list_all()?;
        Ok(IndexStats {
            indexed: self.index.len(),
            pages: pages.len(),
            embedded_pages: pages.iter().filter(|p| p.has_embedding()).count(),
        })
    }

    /// `Some(vector)` when the page should be indexed, `None` when its input
    /// is too thin or the provider could not produce a usable vector.
    async fn compute_embedding(&self, page: &Page) -> Option<Vec<f32>> {
        if page.is_image_heavy() && page.derived_summary.is_none() {
            log::debug!("[IndexMaintenance] Page {} is waiting for a caption", page.id);
            return None;
        }
        let input = page_input(page);
        if !is_embeddable(&input, self.behavior.min_embed_chars) {
            log::debug!("[IndexMaintenance] Page {} has too little text to embed", page.id);
            return None;
        }

        match self.provider.embed(&input).await {
            Ok(vector) if vector.len() == self.index.dimensions() => Some(vector),
            Ok(vector) => {
                log::warn!(
                    "[IndexMaintenance] Page {} embedding has {} dimensions, index expects {}",
                    page.id,
                    vector.len(),
                    self.index.dimensions()
                );
                None
            }
            Err(e) => {
                log::warn!("[IndexMaintenance] Embedding page {} failed: {}", page.id, e);
                None
            }
        }
    }

    /// Store and index `embedding` if the page still produces `input`.
    /// Returns `false`, writing nothing, when the page moved on meanwhile.
    fn commit_embedding(&self, page_id: i64, input: &str, embedding: Option<Vec<f32>>) -> SearchResult<bool> {
        let _gate = self.write_gate.lock();
        let current = self.store.require(page_id)?;
        if page_input(&current) != input {
            return Ok(false);
        }
        self.store.set_embedding(page_id, embedding.as_deref())?;
        self.sync_index_entry(page_id, embedding.as_deref())?;
        Ok(true)
    }

    fn sync_index_entry(&self, page_id: i64, embedding: Option<&[f32]>) -> SearchResult<()> {
        let embedding = embedding.filter(|v| !v.is_empty());
        self.index.upsert(page_id, embedding)?;
        log::debug!(
            "[IndexMaintenance] Page {} {}",
            page_id,
            if embedding.is_some() { "indexed" } else { "removed from index" }
        );
        Ok(())
    }

    fn rebuild_locked(&self, pages: &[Page]) -> SearchResult<usize> {
        let mut fresh = VectorIndex::new(self.index.dimensions());
        for page in pages {
            let Some(vector) = page.embedding.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            match fresh.add(page.id, vector) {
                Ok(()) => {}
                Err(SearchError::DimensionMismatch { expected, actual }) => {
                    log::warn!(
                        "[IndexMaintenance] Dropping stored embedding of page {} ({} dimensions, expected {})",
                        page.id,
                        actual,
                        expected
                    );
                    self.store.set_embedding(page.id, None)?;
                }
                Err(e) => return Err(e),
            }
        }
        let count = fresh.len();
        self.index.replace(fresh)?;
        log::info!("[IndexMaintenance] Rebuilt index with {} vectors", count);
        Ok(count)
    }
}

/// The text a page's embedding is computed from
fn page_input(page: &Page) -> String {
    embedding_input(&page.text, page.derived_summary.as_deref(), &page.tags)
}
