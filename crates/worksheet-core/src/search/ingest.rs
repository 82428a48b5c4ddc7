//! Document ingestion
//!
//! Turns the pages of an already-extracted document into stored, embedded
//! and indexed pages. One bad page never aborts the rest of the document.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::config::SearchBehaviorConfig;
use super::enrichment::{EnrichmentOutcome, TextEnricher};
use super::error::{SearchError, SearchResult};
use super::maintenance::IndexMaintenance;
use crate::tags::{folder_tags, IMAGE_HEAVY_TAG};
use crate::{CoreError, NewPage, TagSet};

/// Stored in place of the text of pages that are mostly images
pub const IMAGE_HEAVY_PLACEHOLDER: &str = "[Image-heavy page, pending AI captioning]";

/// Number of page texts echoed back in the report
const PREVIEW_PAGES: usize = 3;

/// One page as produced by the PDF extractor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedPage {
    /// 1-based
    pub page_number: u32,
    pub text: String,
    #[serde(default)]
    pub image_count: usize,
}

/// A whole uploaded document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedDocument {
    /// Upload name, possibly with folders (`1st Grade/Unit 2/week3.pdf`)
    pub source_name: String,
    #[serde(default)]
    pub source_path: Option<String>,
    pub pages: Vec<ExtractedPage>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub source_name: String,
    pub page_count: usize,
    pub embedded_count: usize,
    pub image_heavy_count: usize,
    /// Page numbers that could not be stored
    pub failed_pages: Vec<u32>,
    pub preview: Vec<String>,
}

pub struct Ingestor {
    maintenance: Arc<IndexMaintenance>,
    enricher: Option<Arc<dyn TextEnricher>>,
    behavior: SearchBehaviorConfig,
}

impl Ingestor {
    pub fn new(maintenance: Arc<IndexMaintenance>, behavior: SearchBehaviorConfig) -> Self {
        Self {
            maintenance,
            enricher: None,
            behavior,
        }
    }

    /// Clean page text and suggest tags with a language model
    pub fn with_enricher(mut self, enricher: Arc<dyn TextEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn is_image_heavy(&self, page: &ExtractedPage) -> bool {
        page.image_count > 0 && page.text.trim().chars().count() < self.behavior.image_heavy_chars
    }

    pub async fn ingest(&self, document: ExtractedDocument) -> SearchResult<IngestReport> {
        let store = self.maintenance.store();
        if !store.list_by_source(&document.source_name)?.is_empty() {
            return Err(SearchError::Core(CoreError::Message(format!(
                "\"{}\" has already been ingested.",
                document.source_name
            ))));
        }

        let base_tags = folder_tags(&document.source_name);
        let mut report = IngestReport {
            source_name: document.source_name.clone(),
            ..IngestReport::default()
        };

        log::info!(
            "[Ingest] {} ({} pages)",
            document.source_name,
            document.pages.len()
        );

        for extracted in &document.pages {
            let image_heavy = self.is_image_heavy(extracted);
            let mut tags = base_tags.clone();
            let text = if image_heavy {
                tags.insert(IMAGE_HEAVY_TAG);
                IMAGE_HEAVY_PLACEHOLDER.to_string()
            } else {
                let (text, suggested) = self.clean_text(extracted).await;
                tags.extend_from(&suggested);
                text
            };

            let created = store.create(NewPage {
                source_name: document.source_name.clone(),
                source_path: document.source_path.clone(),
                page_number: extracted.page_number,
                text,
                tags,
                derived_summary: None,
            });
            let page = match created {
                Ok(page) => page,
                Err(e) => {
                    log::warn!(
                        "[Ingest] {} page {} not stored: {}",
                        document.source_name,
                        extracted.page_number,
                        e
                    );
                    report.failed_pages.push(extracted.page_number);
                    continue;
                }
            };

            report.page_count += 1;
            if report.preview.len() < PREVIEW_PAGES {
                report.preview.push(page.text.clone());
            }

            // Image-heavy pages wait for a caption before they are embedded.
            if image_heavy {
                report.image_heavy_count += 1;
                continue;
            }

            match self.maintenance.on_page_created(&page).await {
                Ok(page) if page.has_embedding() => report.embedded_count += 1,
                Ok(_) => {}
                Err(e) => log::warn!("[Ingest] Indexing page {} failed: {}", page.id, e),
            }
        }

        log::info!(
            "[Ingest] {} done: {} pages, {} embedded, {} image-heavy, {} failed",
            report.source_name,
            report.page_count,
            report.embedded_count,
            report.image_heavy_count,
            report.failed_pages.len()
        );
        Ok(report)
    }

    /// Cleaned text plus suggested tags. Without an enricher, or when it
    /// fails or answers unstructured, the extracted text is kept as is.
    async fn clean_text(&self, page: &ExtractedPage) -> (String, TagSet) {
        let raw = page.text.trim().to_string();
        let Some(enricher) = &self.enricher else {
            return (raw, TagSet::new());
        };
        match enricher.enrich(&raw).await {
            Ok(outcome @ EnrichmentOutcome::Parsed { .. }) => outcome.into_parts(),
            Ok(EnrichmentOutcome::Unparsed { .. }) => {
                log::debug!("[Ingest] Page {} cleanup reply was unstructured", page.page_number);
                (raw, TagSet::new())
            }
            Err(e) => {
                log::warn!("[Ingest] Page {} cleanup failed: {}", page.page_number, e);
                (raw, TagSet::new())
            }
        }
    }
}
