//! OpenAI-compatible embeddings client.

use super::Embedder;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration for embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for EmbeddingHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl EmbeddingHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `ECHOLESS_EMBEDDING_TIMEOUT_MS` and
    /// `ECHOLESS_EMBEDDING_CONNECT_TIMEOUT_MS` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ECHOLESS_EMBEDDING_TIMEOUT_MS")
            && let Ok(timeout_ms) = v.parse::<u64>()
        {
            self.timeout_ms = timeout_ms;
        }
        if let Ok(v) = std::env::var("ECHOLESS_EMBEDDING_CONNECT_TIMEOUT_MS")
            && let Ok(connect_timeout_ms) = v.parse::<u64>()
        {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }

    fn build_client(self) -> reqwest::blocking::Client {
        let mut builder = reqwest::blocking::Client::builder();
        if self.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        }
        if self.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        }

        builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build embedding HTTP client: {err}");
            reqwest::blocking::Client::new()
        })
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";

    /// Dimensions of [`Self::DEFAULT_MODEL`].
    pub const DEFAULT_DIMENSIONS: usize = 1536;

    /// Creates a client reading `OPENAI_API_KEY` from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().map(SecretString::from),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            dimensions: Self::DEFAULT_DIMENSIONS,
            client: EmbeddingHttpConfig::from_env().build_client(),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the API endpoint (without the `/embeddings` suffix).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the model and its output dimensions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Replaces the HTTP client with one built from `config`.
    #[must_use]
    pub fn with_http_config(mut self, config: EmbeddingHttpConfig) -> Self {
        self.client = config.build_client();
        self
    }

    fn provider_error(&self, cause: impl Into<String>) -> Error {
        Error::EmbeddingProvider {
            provider: self.name().to_string(),
            cause: cause.into(),
        }
    }

    fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| self.provider_error("OPENAI_API_KEY not set"))?;

        let expected = input.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .map_err(|e| self.provider_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(self.provider_error(format!("API returned status: {status} - {body}")));
        }

        let mut response: EmbeddingResponse = response
            .json()
            .map_err(|e| self.provider_error(format!("invalid response: {e}")))?;

        if response.data.len() != expected {
            return Err(self.provider_error(format!(
                "expected {expected} embeddings, got {}",
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(Error::InvariantViolation(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                bad.len(),
                self.dimensions
            )));
        }

        Ok(vectors)
    }
}

impl Default for OpenAiEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        self.request(vec![text.to_string()])?
            .pop()
            .ok_or_else(|| self.provider_error("empty response"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.iter().map(|t| (*t).to_string()).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
