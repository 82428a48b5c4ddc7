//! Error types for the search module

use thiserror::Error;

use crate::CoreError;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Vector length does not match the index dimension
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding or captioning provider failed
    #[error("provider error: {0}")]
    Provider(String),

    /// The query could not be embedded, so no search was run
    #[error("query embedding failed: {0}")]
    QueryEmbedding(String),

    #[error("page {0} not found")]
    NotFound(i64),

    #[error("embedding API key is not configured")]
    ApiKeyMissing,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for SearchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(id) => SearchError::NotFound(id),
            other => SearchError::Core(other),
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
