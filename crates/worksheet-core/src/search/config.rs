//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::{SearchError, SearchResult};

/// Main search configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Embedding API configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval and ingestion behavior
    #[serde(default)]
    pub search: SearchBehaviorConfig,

    /// Paths configuration
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Which wire dialect the embedding endpoint speaks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingApi {
    /// `POST {api_base}/embeddings` with a bearer token
    #[default]
    OpenAi,
    /// `POST {api_base}/openai/deployments/{deployment}/embeddings?api-version=..`
    /// with an `api-key` header
    Azure,
}

/// Embedding API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api: EmbeddingApi,

    /// API key (can also use EMBEDDING_API_KEY / OPENAI_API_KEY env vars)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL, or the resource endpoint for Azure
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Azure deployment name
    #[serde(default)]
    pub deployment: Option<String>,

    /// Azure api-version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Embedding dimensions; the vector index is created with this size
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api: EmbeddingApi::default(),
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            deployment: None,
            api_version: default_api_version(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Get API key from config or environment
    pub fn get_api_key(&self) -> SearchResult<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        std::env::var("EMBEDDING_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .or_else(|_| std::env::var("AZURE_OPENAI_API_KEY"))
            .map_err(|_| SearchError::ApiKeyMissing)
    }

    /// Full URL of the embeddings endpoint
    pub fn endpoint_url(&self) -> SearchResult<String> {
        let base = self.api_base.trim_end_matches('/');
        match self.api {
            EmbeddingApi::OpenAi => Ok(format!("{}/embeddings", base)),
            EmbeddingApi::Azure => {
                let deployment = self
                    .deployment
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| SearchError::Config("Azure deployment name is required".into()))?;
                Ok(format!(
                    "{}/openai/deployments/{}/embeddings?api-version={}",
                    base, deployment, self.api_version
                ))
            }
        }
    }
}

fn default_api_base() -> String {
    std::env::var("EMBEDDING_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_timeout_secs() -> u64 {
    60
}

/// Retrieval and ingestion behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBehaviorConfig {
    /// Number of nearest neighbors used as seeds
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,

    /// Score for pages returned directly by the vector index
    #[serde(default = "default_direct_score")]
    pub direct_score: f32,

    /// Score for pages reached through a shared tag
    #[serde(default = "default_expansion_score")]
    pub expansion_score: f32,

    /// Appended to queries that don't mention the audience keyword
    #[serde(default = "default_query_context")]
    pub query_context: String,

    /// Queries containing this keyword (case-insensitive) are embedded unchanged
    #[serde(default = "default_audience_keyword")]
    pub audience_keyword: String,

    /// Embedding input at or below this many characters (trimmed) is not embedded
    #[serde(default = "default_min_embed_chars")]
    pub min_embed_chars: usize,

    /// Pages with images and less text than this are treated as image-heavy
    #[serde(default = "default_image_heavy_chars")]
    pub image_heavy_chars: usize,
}

impl Default for SearchBehaviorConfig {
    fn default() -> Self {
        Self {
            seed_count: default_seed_count(),
            direct_score: default_direct_score(),
            expansion_score: default_expansion_score(),
            query_context: default_query_context(),
            audience_keyword: default_audience_keyword(),
            min_embed_chars: default_min_embed_chars(),
            image_heavy_chars: default_image_heavy_chars(),
        }
    }
}

fn default_seed_count() -> usize {
    10
}

fn default_direct_score() -> f32 {
    1.0
}

fn default_expansion_score() -> f32 {
    0.6
}

fn default_query_context() -> String {
    " for early elementary education".to_string()
}

fn default_audience_keyword() -> String {
    "grade".to_string()
}

fn default_min_embed_chars() -> usize {
    10
}

fn default_image_heavy_chars() -> usize {
    40
}

/// Paths configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// SQLite page database
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl PathsConfig {
    /// Get the page database path, using default if not specified
    pub fn get_db_path(&self) -> PathBuf {
        if let Some(ref path) = self.db_path {
            return path.clone();
        }
        SearchConfig::config_dir().join("pages.db")
    }
}

/// Flat `.env`-style config.json, using the variable names the upload
/// backend has always read
#[derive(Debug, Clone, Default, Deserialize)]
struct FlatConfig {
    #[serde(rename = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,
    #[serde(rename = "EMBEDDING_API_BASE")]
    embedding_api_base: Option<String>,
    #[serde(rename = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    #[serde(rename = "AZURE_OPENAI_API_KEY")]
    azure_api_key: Option<String>,
    #[serde(rename = "AZURE_OPENAI_ENDPOINT")]
    azure_endpoint: Option<String>,
    #[serde(rename = "AZURE_OPENAI_DEPLOYMENT")]
    azure_deployment: Option<String>,
    #[serde(rename = "AZURE_OPENAI_API_VERSION")]
    azure_api_version: Option<String>,
}

impl FlatConfig {
    fn merge_into(self, config: &mut EmbeddingConfig) {
        if let Some(endpoint) = non_empty(self.azure_endpoint) {
            config.api = EmbeddingApi::Azure;
            config.api_base = endpoint;
        }
        if let Some(deployment) = non_empty(self.azure_deployment) {
            config.deployment = Some(deployment);
        }
        if let Some(version) = non_empty(self.azure_api_version) {
            config.api_version = version;
        }
        // Explicit EMBEDDING_* names take precedence over the Azure ones.
        if let Some(key) = non_empty(self.embedding_api_key).or(non_empty(self.azure_api_key)) {
            config.api_key = Some(key);
        }
        if let Some(base) = non_empty(self.embedding_api_base) {
            config.api_base = base;
        }
        if let Some(model) = non_empty(self.embedding_model) {
            config.model = model;
        }
    }

    fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok();
        Self {
            embedding_api_key: var("EMBEDDING_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            embedding_api_base: var("EMBEDDING_API_BASE"),
            embedding_model: var("EMBEDDING_MODEL"),
            azure_api_key: var("AZURE_OPENAI_API_KEY"),
            azure_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            azure_deployment: var("AZURE_OPENAI_DEPLOYMENT"),
            azure_api_version: var("AZURE_OPENAI_API_VERSION"),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SearchConfig {
    /// Load configuration from file and environment
    /// Priority: environment variables > config.json > config.toml > defaults
    pub fn load() -> SearchResult<Self> {
        let mut config = Self::default();

        // 1. config.toml (structured)
        let toml_path = Self::toml_config_path();
        if toml_path.exists() {
            let content = std::fs::read_to_string(&toml_path)?;
            match toml::from_str::<SearchConfig>(&content) {
                Ok(toml_config) => config = toml_config,
                Err(e) => log::warn!("[Config] Ignoring invalid {}: {}", toml_path.display(), e),
            }
        }

        // 2. config.json (flat)
        let json_path = Self::json_config_path();
        if json_path.exists() {
            let content = std::fs::read_to_string(&json_path)?;
            match serde_json::from_str::<FlatConfig>(&content) {
                Ok(flat) => flat.merge_into(&mut config.embedding),
                Err(e) => log::warn!("[Config] Ignoring invalid {}: {}", json_path.display(), e),
            }
        }

        // 3. Environment variables (highest priority)
        FlatConfig::from_env().merge_into(&mut config.embedding);
        if let Some(db_path) = std::env::var_os("WORKSHEET_DB_PATH") {
            config.paths.db_path = Some(PathBuf::from(db_path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the index and retriever cannot work with
    pub fn validate(&self) -> SearchResult<()> {
        if self.embedding.dimensions == 0 {
            return Err(SearchError::Config("embedding dimensions must be positive".into()));
        }
        if self.search.seed_count == 0 {
            return Err(SearchError::Config("seed count must be positive".into()));
        }
        Ok(())
    }

    /// Get base config directory
    pub fn config_dir() -> PathBuf {
        if let Ok(root) = std::env::var("WORKSHEET_ROOT") {
            return PathBuf::from(root);
        }

        dirs::home_dir()
            .map(|h| h.join(".worksheet-search"))
            .unwrap_or_else(|| PathBuf::from(".worksheet-search"))
    }

    /// Flat key/value config file path (config.json)
    pub fn json_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Structured config file path (config.toml)
    pub fn toml_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
