//! Process-wide search handle
//!
//! Owns the one vector index of the process and wires it to the store,
//! the maintenance path and the retriever. Created at startup, dropped at
//! shutdown; hand out clones of the `Arc` rather than globals.

use std::sync::Arc;

use super::config::SearchConfig;
use super::embedding::{EmbeddingClient, EmbeddingProvider};
use super::enrichment::{Captioner, TextEnricher};
use super::error::{SearchError, SearchResult};
use super::ingest::{ExtractedDocument, IngestReport, Ingestor};
use super::maintenance::IndexMaintenance;
use super::retrieval::Retriever;
use super::types::{IndexStats, SearchHit, SearchOptions, SearchResults};
use super::vector_index::SharedIndex;
use crate::{Page, PageStore, TagCount, TagGraph};

pub struct Searcher {
    store: PageStore,
    maintenance: Arc<IndexMaintenance>,
    retriever: Retriever,
    ingestor: Ingestor,
}

impl Searcher {
    /// Open the configured store, connect the embedding API and load every
    /// stored embedding into a fresh index.
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        config.validate()?;
        let store = PageStore::open(config.paths.get_db_path())?;
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(EmbeddingClient::new(config.embedding.clone())?);
        Self::with_provider(config, store, provider)
    }

    /// Build around an existing store and provider.
    pub fn with_provider(
        config: SearchConfig,
        store: PageStore,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> SearchResult<Self> {
        config.validate()?;
        if provider.dimensions() != config.embedding.dimensions {
            return Err(SearchError::Config(format!(
                "provider returns {} dimensions, index is configured for {}",
                provider.dimensions(),
                config.embedding.dimensions
            )));
        }
        let index = Arc::new(SharedIndex::new(config.embedding.dimensions));
        let maintenance = Arc::new(IndexMaintenance::new(
            store.clone(),
            index.clone(),
            provider.clone(),
            config.search.clone(),
        ));
        maintenance.rebuild_from_store()?;

        let retriever = Retriever::new(store.clone(), index, provider, config.search.clone());
        let ingestor = Ingestor::new(maintenance.clone(), config.search);

        Ok(Self {
            store,
            maintenance,
            retriever,
            ingestor,
        })
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn TextEnricher>) -> Self {
        self.ingestor = self.ingestor.with_enricher(enricher);
        self
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn maintenance(&self) -> &Arc<IndexMaintenance> {
        &self.maintenance
    }

    pub async fn search(&self, query: &str, tag: Option<&str>) -> SearchResult<Vec<SearchHit>> {
        self.retriever.search(query, tag).await
    }

    pub async fn search_with(&self, options: &SearchOptions) -> SearchResult<SearchResults> {
        self.retriever.search_with(options).await
    }

    pub async fn ingest(&self, document: ExtractedDocument) -> SearchResult<IngestReport> {
        self.ingestor.ingest(document).await
    }

    pub async fn update_tags(&self, page_id: i64, raw_tags: &str) -> SearchResult<Page> {
        self.maintenance.update_tags(page_id, raw_tags).await
    }

    pub async fn caption_page(&self, page_id: i64, captioner: &dyn Captioner) -> SearchResult<Page> {
        self.maintenance.caption_page(page_id, captioner).await
    }

    pub fn reset(&self) -> SearchResult<usize> {
        self.maintenance.reset_corpus()
    }

    pub fn list_tags(&self) -> SearchResult<Vec<String>> {
        Ok(self.store.list_tags()?)
    }

    pub fn top_tags(&self, limit: usize) -> SearchResult<Vec<TagCount>> {
        Ok(self.store.top_tags(limit)?)
    }

    pub fn tag_graph(&self) -> SearchResult<TagGraph> {
        Ok(self.store.tag_graph()?)
    }

    pub fn stats(&self) -> SearchResult<IndexStats> {
        self.maintenance.stats()
    }
}
