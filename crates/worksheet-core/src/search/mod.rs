//! Worksheet Search Module
//!
//! Semantic + tag search over stored worksheet pages.
//!
//! ## Features
//!
//! - Exact in-memory vector index (squared L2) kept in sync with the page store
//! - OpenAI / Azure OpenAI embedding API integration
//! - Two-tier retrieval: vector seeds, then pages sharing a tag with a seed
//! - Ingestion of extracted PDF pages with optional AI text cleanup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use worksheet_core::search::{Searcher, SearchConfig};
//!
//! let searcher = Searcher::new(SearchConfig::load()?)?;
//! let hits = searcher.search("counting shapes", Some("grade1")).await?;
//! ```

mod config;
mod embedding;
mod enrichment;
mod error;
mod ingest;
mod maintenance;
mod retrieval;
mod searcher;
mod types;
mod vector_index;


pub use config::{EmbeddingApi, EmbeddingConfig, PathsConfig, SearchBehaviorConfig, SearchConfig};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use enrichment::{Captioner, EnrichmentOutcome, TextEnricher};
pub use error::{SearchError, SearchResult};
pub use ingest::{ExtractedDocument, ExtractedPage, IngestReport, Ingestor, IMAGE_HEAVY_PLACEHOLDER};
pub use maintenance::IndexMaintenance;
pub use retrieval::Retriever;
pub use searcher::Searcher;
pub use types::*;
pub use vector_index::{SharedIndex, VectorIndex};
