//! Configuration management.
//!
//! Settings are layered: built-in defaults, then the TOML config file, then
//! environment variables (a `.env` file in the working directory is loaded
//! first). Every value is validated; nothing is clamped.
//!
//! ```toml
//! data_dir = "/var/lib/echoless"
//!
//! [dedup]
//! semantic_distance_threshold = 0.12
//! retention_days = 14
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dimensions = 1536
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! ```

use crate::embedding::{
    BulkheadEmbedder, Embedder, EmbeddingBulkheadConfig, EmbeddingHttpConfig, HashedEmbedder,
    OpenAiEmbedder,
};
use crate::services::deduplication::{DeduplicationConfig, DeduplicationConfigPatch, merge};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main configuration for echoless.
#[derive(Debug, Clone)]
pub struct EcholessConfig {
    /// Directory holding the content database.
    pub data_dir: PathBuf,
    /// Deduplication settings.
    pub dedup: DeduplicationConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingSettings,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Available embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbeddingProvider {
    /// Deterministic offline pseudo-embeddings.
    #[default]
    #[serde(rename = "hashed")]
    Hashed,
    /// `OpenAI`-compatible `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbeddingProvider {
    /// Parses a provider name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown provider.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashed" | "hash" | "local" => Ok(Self::Hashed),
            "openai" | "open_ai" | "open-ai" => Ok(Self::OpenAi),
            other => Err(Error::Configuration(format!(
                "unknown embedding provider '{other}' (expected 'hashed' or 'openai')"
            ))),
        }
    }

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hashed => "hashed",
            Self::OpenAi => "openai",
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSettings {
    /// Provider.
    pub provider: EmbeddingProvider,
    /// Model name (`OpenAI` provider).
    pub model: Option<String>,
    /// Output dimensions; provider default when unset.
    pub dimensions: Option<usize>,
    /// API endpoint override (`OpenAI` provider).
    pub endpoint: Option<String>,
    /// API key; falls back to `OPENAI_API_KEY`.
    pub api_key: Option<SecretString>,
    /// HTTP timeouts.
    pub http: EmbeddingHttpConfig,
    /// Concurrency limit around the provider.
    pub bulkhead: EmbeddingBulkheadConfig,
}

impl EmbeddingSettings {
    /// Dimensions the configured provider produces.
    #[must_use]
    pub fn resolved_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.provider {
            EmbeddingProvider::Hashed => HashedEmbedder::DEFAULT_DIMENSIONS,
            EmbeddingProvider::OpenAi => OpenAiEmbedder::DEFAULT_DIMENSIONS,
        })
    }

    /// Builds the configured embedder.
    ///
    /// Remote providers are wrapped in a [`BulkheadEmbedder`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the dimensions are invalid.
    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let dimensions = self.resolved_dimensions();
        match self.provider {
            EmbeddingProvider::Hashed => Ok(Arc::new(HashedEmbedder::with_dimensions(dimensions)?)),
            EmbeddingProvider::OpenAi => {
                if dimensions == 0 {
                    return Err(Error::Configuration(
                        "embedding dimensions must be > 0".to_string(),
                    ));
                }
                let model = self
                    .model
                    .clone()
                    .unwrap_or_else(|| OpenAiEmbedder::DEFAULT_MODEL.to_string());
                let mut embedder = OpenAiEmbedder::new()
                    .with_model(model, dimensions)
                    .with_http_config(self.http);
                if let Some(endpoint) = &self.endpoint {
                    embedder = embedder.with_endpoint(endpoint.as_str());
                }
                if let Some(key) = &self.api_key {
                    embedder = embedder.with_api_key(key.expose_secret());
                }
                Ok(Arc::new(BulkheadEmbedder::new(embedder, self.bulkhead)))
            },
        }
    }
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `echoless=debug`.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics settings from the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    pub enabled: Option<bool>,
}

/// Observability settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilitySettings {
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Deduplication overrides.
    pub dedup: Option<DeduplicationConfigPatch>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Embedding section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileEmbedding {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Output dimensions.
    pub dimensions: Option<usize>,
    /// Endpoint override.
    pub endpoint: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
    /// Bulkhead permits.
    pub max_concurrent: Option<usize>,
    /// Bulkhead acquire timeout.
    pub acquire_timeout_ms: Option<u64>,
    /// Reject immediately when the bulkhead is full.
    pub fail_fast: Option<bool>,
}

/// Serializable view of the effective configuration, secrets excluded.
#[derive(Debug, Serialize)]
pub struct ConfigView<'a> {
    /// Data directory.
    pub data_dir: &'a Path,
    /// Deduplication settings.
    pub dedup: &'a DeduplicationConfig,
    /// Embedding settings.
    pub embedding: EmbeddingView<'a>,
    /// Logging section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<&'a LoggingSettings>,
    /// Metrics section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<&'a MetricsSettings>,
}

/// Embedding part of [`ConfigView`].
#[derive(Debug, Serialize)]
pub struct EmbeddingView<'a> {
    /// Provider.
    pub provider: EmbeddingProvider,
    /// Model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    /// Resolved dimensions.
    pub dimensions: usize,
    /// Endpoint override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<&'a str>,
    /// Whether an API key is configured in the file.
    pub api_key_configured: bool,
    /// Request timeout.
    pub timeout_ms: u64,
    /// Connect timeout.
    pub connect_timeout_ms: u64,
    /// Bulkhead permits.
    pub max_concurrent: usize,
    /// Bulkhead acquire timeout.
    pub acquire_timeout_ms: u64,
    /// Bulkhead fail-fast mode.
    pub fail_fast: bool,
}

impl Default for EcholessConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dedup: DeduplicationConfig::default(),
            embedding: EmbeddingSettings::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

/// Platform data directory (`~/.local/share/echoless` on Linux), or
/// `.echoless` when no home directory is known.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "echoless").map_or_else(
        || PathBuf::from(".echoless"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Platform config file path (`~/.config/echoless/config.toml` on Linux).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("echoless").join("config.toml"))
}

impl EcholessConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the full layered configuration.
    ///
    /// Reads `.env`, then `path` (or the default config file when it
    /// exists), then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or any value
    /// is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(env_path) => tracing::debug!(path = %env_path.display(), "Loaded .env file"),
            Err(err) if err.not_found() => {},
            Err(err) => tracing::warn!(error = %err, "Failed to load .env file"),
        }

        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        config.with_env_overrides()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or any value
    /// is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on unknown keys, malformed TOML or
    /// invalid values.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("config file: {e}")))?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location, or defaults when no
    /// config file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing default config file is invalid.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_file(&path)
            },
            _ => Ok(Self::default()),
        }
    }

    /// Converts a `ConfigFile` to `EcholessConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(patch) = file.dedup {
            config.dedup = merge(&config.dedup, &patch)?;
        }
        if let Some(embedding) = file.embedding {
            config.embedding = Self::embedding_from_file(embedding)?;
        }
        config.observability = ObservabilitySettings {
            logging: file.logging,
            metrics: file.metrics,
        };

        Ok(config)
    }

    fn embedding_from_file(file: ConfigFileEmbedding) -> Result<EmbeddingSettings> {
        let mut settings = EmbeddingSettings::default();
        if let Some(provider) = file.provider {
            settings.provider = EmbeddingProvider::parse(&provider)?;
        }
        settings.model = file.model;
        settings.dimensions = file.dimensions;
        settings.endpoint = file.endpoint;
        settings.api_key = file.api_key.map(SecretString::from);
        if let Some(timeout_ms) = file.timeout_ms {
            settings.http.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = file.connect_timeout_ms {
            settings.http.connect_timeout_ms = connect_timeout_ms;
        }
        if let Some(max_concurrent) = file.max_concurrent {
            if max_concurrent == 0 {
                return Err(Error::Configuration(
                    "embedding.max_concurrent must be > 0".to_string(),
                ));
            }
            settings.bulkhead.max_concurrent = max_concurrent;
        }
        if let Some(acquire_timeout_ms) = file.acquire_timeout_ms {
            settings.bulkhead.acquire_timeout_ms = acquire_timeout_ms;
        }
        if let Some(fail_fast) = file.fail_fast {
            settings.bulkhead.fail_fast = fail_fast;
        }
        Ok(settings)
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Overrides |
    /// |----------|-----------|
    /// | `ECHOLESS_DATA_DIR` | `data_dir` |
    /// | `ECHOLESS_DEDUP_*` | `[dedup]` keys |
    /// | `ECHOLESS_EMBEDDING_PROVIDER` | `embedding.provider` |
    /// | `ECHOLESS_EMBEDDING_MODEL` | `embedding.model` |
    /// | `ECHOLESS_EMBEDDING_ENDPOINT` | `embedding.endpoint` |
    /// | `ECHOLESS_EMBEDDING_*_TIMEOUT_MS`, `ECHOLESS_EMBEDDING_BULKHEAD_*` | timeouts and bulkhead |
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a variable is invalid.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("ECHOLESS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        let patch = DeduplicationConfigPatch::from_env()?;
        if !patch.is_empty() {
            self.dedup = merge(&self.dedup, &patch)?;
        }

        if let Ok(provider) = std::env::var("ECHOLESS_EMBEDDING_PROVIDER") {
            self.embedding.provider = EmbeddingProvider::parse(&provider)?;
        }
        if let Ok(model) = std::env::var("ECHOLESS_EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        if let Ok(endpoint) = std::env::var("ECHOLESS_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        self.embedding.http = self.embedding.http.with_env_overrides();
        self.embedding.bulkhead = self.embedding.bulkhead.with_env_overrides();

        Ok(self)
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Path of the content database inside the data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("content.db")
    }

    /// Serializable view of the effective configuration.
    #[must_use]
    pub fn view(&self) -> ConfigView<'_> {
        ConfigView {
            data_dir: &self.data_dir,
            dedup: &self.dedup,
            embedding: EmbeddingView {
                provider: self.embedding.provider,
                model: self.embedding.model.as_deref(),
                dimensions: self.embedding.resolved_dimensions(),
                endpoint: self.embedding.endpoint.as_deref(),
                api_key_configured: self.embedding.api_key.is_some(),
                timeout_ms: self.embedding.http.timeout_ms,
                connect_timeout_ms: self.embedding.http.connect_timeout_ms,
                max_concurrent: self.embedding.bulkhead.max_concurrent,
                acquire_timeout_ms: self.embedding.bulkhead.acquire_timeout_ms,
                fail_fast: self.embedding.bulkhead.fail_fast,
            },
            logging: self.observability.logging.as_ref(),
            metrics: self.observability.metrics.as_ref(),
        }
    }

    /// Renders the effective configuration as TOML, secrets excluded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.view()).map_err(|e| Error::OperationFailed {
            operation: "serialize_config".to_string(),
            cause: e.to_string(),
        })
    }
}
