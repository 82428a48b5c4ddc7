//! Embedding provider seam and the HTTP embedding client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::config::{EmbeddingApi, EmbeddingConfig};
use super::error::{SearchError, SearchResult};

/// Maps text to a fixed-length vector.
///
/// Implementations are remote and fallible; every failure surfaces as
/// [`SearchError::Provider`] or a transport error.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of the vectors this provider returns
    fn dimensions(&self) -> usize;

    /// Embed a single text
    async fn embed(&self, text: &str) -> SearchResult<Vec<f32>>;
}

/// OpenAI-compatible embedding API client (also speaks the Azure
/// deployment dialect)
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    /// Azure routes by deployment and ignores this
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
    /// Only sent for models that support it (e.g. text-embedding-3-*)
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: EmbeddingConfig) -> SearchResult<Self> {
        let api_key = config.get_api_key()?;
        let url = config.endpoint_url()?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            config,
            client,
            api_key,
            url,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api {
            EmbeddingApi::OpenAi => request.bearer_auth(&self.api_key),
            EmbeddingApi::Azure => request.header("api-key", &self.api_key),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> SearchResult<Vec<Vec<f32>>> {
        // Most embedding APIs cap input around 8K tokens; char count is a
        // conservative stand-in.
        const MAX_CHARS: usize = 8000;
        let texts: Vec<String> = texts
            .iter()
            .map(|t| {
                if t.chars().count() > MAX_CHARS {
                    t.chars().take(MAX_CHARS).collect()
                } else {
                    t.clone()
                }
            })
            .collect();

        let (model, dimensions) = match self.config.api {
            EmbeddingApi::OpenAi => {
                let dims = self
                    .config
                    .model
                    .starts_with("text-embedding-3")
                    .then_some(self.config.dimensions);
                (Some(self.config.model.as_str()), dims)
            }
            EmbeddingApi::Azure => (None, None),
        };

        let request = EmbeddingRequest {
            model,
            input: &texts,
            dimensions,
        };

        let response = self
            .authorize(self.client.post(&self.url))
            .json(&request)
            .send()
            .await
            .map_err(SearchError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(SearchError::Http)?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(SearchError::Provider(error_response.error.message));
            }
            return Err(SearchError::Provider(format!("API error ({}): {}", status, body)));
        }

        let response: EmbeddingResponse = serde_json::from_str(&body)?;

        if response.data.len() != texts.len() {
            return Err(SearchError::Provider(format!(
                "Embedding count mismatch: sent {} texts, got {} embeddings",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        if let Some(first) = data.first() {
            if first.embedding.len() != self.config.dimensions {
                log::warn!(
                    "[Embedding] Provider returned {} dimensions, configured for {}",
                    first.embedding.len(),
                    self.config.dimensions
                );
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Provider("No embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.api, EmbeddingApi::OpenAi);
    }

    #[test]
    fn test_azure_endpoint_url() {
        let config = EmbeddingConfig {
            api: EmbeddingApi::Azure,
            api_base: "https://example.openai.azure.com/".into(),
            deployment: Some("embed-small".into()),
            api_version: "2024-02-01".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(
            config.endpoint_url().unwrap(),
            "https://example.openai.azure.com/openai/deployments/embed-small/embeddings?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_azure_requires_deployment() {
        let config = EmbeddingConfig {
            api: EmbeddingApi::Azure,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(config.endpoint_url(), Err(SearchError::Config(_))));
    }

    #[test]
    fn test_client_with_explicit_key() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            api_base: "http://localhost:9".into(),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::new(config).unwrap();
        assert_eq!(client.dimensions(), 1536);
        assert_eq!(client.url, "http://localhost:9/embeddings");
    }
}
