//! Concurrency limit for embedding calls.
//!
//! Embedding calls are the slowest step of a duplicate check and usually hit
//! a rate-limited remote provider. [`BulkheadEmbedder`] caps how many run at
//! once so a burst of checks queues (or fails fast) instead of piling up
//! requests against the provider.
//!
//! ```rust
//! use echoless::Embedder;
//! use echoless::embedding::{BulkheadEmbedder, EmbeddingBulkheadConfig, HashedEmbedder};
//!
//! let config = EmbeddingBulkheadConfig::new().with_max_concurrent(4);
//! let embedder = BulkheadEmbedder::new(HashedEmbedder::new(), config);
//! assert_eq!(embedder.available_permits(), 4);
//! let _vector = embedder.embed("Progress, not perfection")?;
//! # Ok::<(), echoless::Error>(())
//! ```

use super::Embedder;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Upper bound on waiting when no acquire timeout is configured.
const MAX_WAIT_MS: u64 = 120_000;

/// Configuration for the embedding bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingBulkheadConfig {
    /// Maximum concurrent embedding calls.
    pub max_concurrent: usize,
    /// Timeout for acquiring a permit in milliseconds (0 = capped wait).
    pub acquire_timeout_ms: u64,
    /// Reject immediately when every permit is taken.
    pub fail_fast: bool,
}

impl Default for EmbeddingBulkheadConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBulkheadConfig {
    /// Creates the default configuration: 4 permits, 10s acquire timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent: 4,
            acquire_timeout_ms: 10_000,
            fail_fast: false,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ECHOLESS_EMBEDDING_BULKHEAD_MAX_CONCURRENT` | Max concurrent calls | 4 |
    /// | `ECHOLESS_EMBEDDING_BULKHEAD_ACQUIRE_TIMEOUT_MS` | Permit timeout | 10000 |
    /// | `ECHOLESS_EMBEDDING_BULKHEAD_FAIL_FAST` | Fail when full | false |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ECHOLESS_EMBEDDING_BULKHEAD_MAX_CONCURRENT")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_concurrent = parsed.max(1);
        }
        if let Ok(v) = std::env::var("ECHOLESS_EMBEDDING_BULKHEAD_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("ECHOLESS_EMBEDDING_BULKHEAD_FAIL_FAST") {
            self.fail_fast = v.eq_ignore_ascii_case("true") || v == "1";
        }
        self
    }

    /// Sets the maximum concurrent calls.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the acquire timeout in milliseconds.
    #[must_use]
    pub const fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Sets whether to fail fast when the bulkhead is full.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Embedder wrapper limiting concurrent calls to the inner embedder.
pub struct BulkheadEmbedder<E: Embedder> {
    inner: E,
    config: EmbeddingBulkheadConfig,
    semaphore: Arc<Semaphore>,
}

impl<E: Embedder> BulkheadEmbedder<E> {
    /// Wraps `inner` with the given limits.
    #[must_use]
    pub fn new(inner: E, config: EmbeddingBulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner,
            config,
            semaphore,
        }
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the wrapped embedder.
    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    fn rejection(&self, reason: &'static str, cause: String) -> Error {
        metrics::counter!("embedding_bulkhead_rejections_total", "reason" => reason).increment(1);
        Error::EmbeddingProvider {
            provider: self.inner.name().to_string(),
            cause,
        }
    }

    fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let available = self.semaphore.available_permits();
        metrics::gauge!("embedding_bulkhead_available_permits").set(available as f64);

        if self.config.fail_fast {
            return Arc::clone(&self.semaphore)
                .try_acquire_owned()
                .map_err(|_| {
                    self.rejection(
                        "full",
                        format!(
                            "embedding bulkhead full ({} concurrent calls)",
                            self.config.max_concurrent.max(1)
                        ),
                    )
                })
                .inspect(|_| {
                    metrics::counter!("embedding_bulkhead_permits_acquired_total").increment(1);
                });
        }

        let timeout_ms = match self.config.acquire_timeout_ms {
            0 => MAX_WAIT_MS,
            ms => ms,
        };
        let timeout = Duration::from_millis(timeout_ms);
        let start = Instant::now();

        loop {
            if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                metrics::counter!("embedding_bulkhead_permits_acquired_total").increment(1);
                return Ok(permit);
            }

            if start.elapsed() >= timeout {
                return Err(self.rejection(
                    "timeout",
                    format!("embedding bulkhead acquire timed out after {timeout_ms}ms"),
                ));
            }

            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn execute<T>(&self, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let _permit = self.acquire_permit()?;
        tracing::trace!(operation, "Acquired embedding bulkhead permit");

        let result = call();

        tracing::trace!(
            operation,
            success = result.is_ok(),
            "Released embedding bulkhead permit"
        );
        result
    }
}

impl<E: Embedder> Embedder for BulkheadEmbedder<E> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.execute("embed", || self.inner.embed(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.execute("embed_batch", || self.inner.embed_batch(texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowEmbedder {
        delay_ms: u64,
        call_count: AtomicUsize,
    }

    impl SlowEmbedder {
        const fn new(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for SlowEmbedder {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(self.delay_ms));
            Ok(vec![0.5; 8])
        }
    }

    #[test]
    fn test_config_builder() {
        let config = EmbeddingBulkheadConfig::new()
            .with_max_concurrent(2)
            .with_acquire_timeout_ms(500)
            .with_fail_fast(true);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.acquire_timeout_ms, 500);
        assert!(config.fail_fast);
    }

    #[test]
    fn test_passthrough() {
        let bulkhead = BulkheadEmbedder::new(SlowEmbedder::new(0), EmbeddingBulkheadConfig::new());
        assert_eq!(bulkhead.name(), "slow");
        assert_eq!(bulkhead.dimensions(), 8);
        assert_eq!(bulkhead.embed("x").unwrap().len(), 8);
        assert_eq!(bulkhead.inner().call_count.load(Ordering::SeqCst), 1);
        assert_eq!(bulkhead.available_permits(), 4);
    }

    #[test]
    fn test_fail_fast_rejects_when_full() {
        let config = EmbeddingBulkheadConfig::new()
            .with_max_concurrent(1)
            .with_fail_fast(true);
        let bulkhead = Arc::new(BulkheadEmbedder::new(SlowEmbedder::new(300), config));

        let slow = Arc::clone(&bulkhead);
        let handle = std::thread::spawn(move || slow.embed("slow"));

        // Wait until the background call holds the only permit.
        let start = Instant::now();
        while bulkhead.available_permits() > 0 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
        }

        let result = bulkhead.embed("fast");
        assert!(handle.join().unwrap().is_ok());

        let err = result.unwrap_err();
        assert!(matches!(err, Error::EmbeddingProvider { .. }));
        assert!(err.to_string().contains("bulkhead full"));
    }

    #[test]
    fn test_acquire_timeout() {
        let config = EmbeddingBulkheadConfig::new()
            .with_max_concurrent(1)
            .with_acquire_timeout_ms(20);
        let bulkhead = Arc::new(BulkheadEmbedder::new(SlowEmbedder::new(400), config));

        let slow = Arc::clone(&bulkhead);
        let handle = std::thread::spawn(move || slow.embed("slow"));

        let start = Instant::now();
        while bulkhead.available_permits() > 0 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
        }

        let err = bulkhead.embed("fast").unwrap_err();
        assert!(handle.join().unwrap().is_ok());
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("timed out"));
    }
}
