//! Command handlers module.
//!
//! - `core.rs`: check, add, stats, cleanup
//! - `filter.rs`: lexical filter export/import and on-disk snapshots
//! - `config.rs`: configuration display

mod config;
mod core;
mod filter;

use anyhow::Context;
use echoless::DeduplicationService;
use echoless::config::EcholessConfig;
use echoless::storage::SqliteEmbeddingStore;
use std::io::Read;
use std::sync::Arc;

pub use config::cmd_config;
pub use core::{CheckArgs, cmd_add, cmd_check, cmd_cleanup, cmd_stats};
pub use filter::{cmd_export_filter, cmd_import_filter};

/// Output mode shared by all commands.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// Emit JSON instead of text.
    pub json: bool,
}

/// Opens the service over the `SQLite` store in the data directory.
///
/// Owners are rehydrated from the store on first use, since every CLI
/// invocation starts with empty lexical state.
fn open_service(config: &EcholessConfig) -> anyhow::Result<DeduplicationService> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("creating data directory {}", config.data_dir.display())
    })?;

    let embedder = config.embedding.build_embedder()?;
    let store = SqliteEmbeddingStore::open(config.database_path(), embedder.dimensions())
        .with_context(|| format!("opening {}", config.database_path().display()))?;
    let dedup = config.dedup.clone().with_rehydrate_on_first_use(true);

    tracing::debug!(
        data_dir = %config.data_dir.display(),
        embedder = embedder.name(),
        dimensions = embedder.dimensions(),
        "Opening deduplication service"
    );
    Ok(DeduplicationService::new(embedder, Arc::new(store), dedup)?)
}

/// Returns `text`, or stdin when it is `-`.
fn read_text(text: &str) -> anyhow::Result<String> {
    if text != "-" {
        return Ok(text.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading text from stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}
