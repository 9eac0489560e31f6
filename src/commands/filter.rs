//! Lexical filter export/import.
//!
//! An imported filter is kept as a snapshot under `<data_dir>/filters/` and
//! takes the place of rehydration for that owner in later invocations;
//! `add` keeps the snapshot current.

use super::{Output, open_service};
use anyhow::Context;
use echoless::DeduplicationService;
use echoless::config::EcholessConfig;
use echoless::models::OwnerId;
use echoless::services::deduplication::FilterState;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// On-disk filter snapshots, one JSON file per owner.
pub struct FilterSnapshots {
    dir: PathBuf,
}

impl FilterSnapshots {
    pub fn new(config: &EcholessConfig) -> Self {
        Self {
            dir: config.data_dir.join("filters"),
        }
    }

    /// Snapshot path for an owner; the id is escaped to a safe file name.
    fn path(&self, owner: &OwnerId) -> PathBuf {
        let mut name = String::with_capacity(owner.as_str().len() + 5);
        for byte in owner.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                let _ = write!(name, "%{byte:02X}");
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    /// Installs the owner's snapshot, if one exists.
    pub fn restore(&self, service: &DeduplicationService, owner: &OwnerId) -> anyhow::Result<bool> {
        let path = self.path(owner);
        if !path.exists() {
            return Ok(false);
        }
        service.import_filter(owner, read_state(&path)?)?;
        tracing::debug!(owner = %owner, path = %path.display(), "Restored filter snapshot");
        Ok(true)
    }

    /// Writes the owner's current filter as its snapshot.
    pub fn save(&self, service: &DeduplicationService, owner: &OwnerId) -> anyhow::Result<()> {
        let state = service
            .export_filter(owner)
            .with_context(|| format!("no lexical state for {owner}"))?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path(owner);
        std::fs::write(&path, serde_json::to_vec(&state)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn read_state(path: &Path) -> anyhow::Result<FilterState> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Export filter command.
pub fn cmd_export_filter(
    config: &EcholessConfig,
    owner: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let owner = OwnerId::new(owner);
    if !FilterSnapshots::new(config).restore(&service, &owner)? {
        service.rehydrate(&owner)?;
    }

    let state = service
        .export_filter(&owner)
        .with_context(|| format!("no lexical state for {owner}"))?;
    let json = serde_json::to_string(&state)?;

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(owner = %owner, path = %path.display(), "Exported filter");
        },
        None => println!("{json}"),
    }
    Ok(())
}

/// Import filter command.
pub fn cmd_import_filter(
    config: &EcholessConfig,
    output: Output,
    owner: &str,
    input: &Path,
) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let owner = OwnerId::new(owner);
    service.import_filter(&owner, read_state(input)?)?;
    FilterSnapshots::new(config).save(&service, &owner)?;

    let stats = service.get_stats(Some(&owner))?;
    if output.json {
        println!("{}", serde_json::to_string_pretty(&stats.lexical)?);
    } else if let Some(lexical) = stats.lexical {
        println!(
            "Imported filter for {owner}: {} bits, {} elements",
            lexical.filter.size, lexical.filter.element_count
        );
    }
    Ok(())
}
