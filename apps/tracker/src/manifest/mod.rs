//! Manifest lookup: numeric item/activity hashes to display metadata.
//!
//! The real manifest is an external dataset; the tracker only needs
//! `resolve(hash)`. `StaticManifest` serves a JSON table loaded at startup and
//! doubles as the test fixture.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Human-readable properties of a manifest entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
}

impl DisplayMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Pure lookup: same hash, same answer, no side effects.
pub trait ManifestResolver: Send + Sync {
    fn resolve(&self, hash: u32) -> Option<DisplayMetadata>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    entries: HashMap<u32, DisplayMetadata>,
}

impl StaticManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (u32, DisplayMetadata)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Loads a JSON object of `"<hash>": { "name": ..., ... }` entries.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest at {}", path.display()))?;
        let table: HashMap<String, DisplayMetadata> =
            serde_json::from_str(&raw).context("Manifest file is not a valid definition table")?;

        let mut entries = HashMap::with_capacity(table.len());
        for (key, metadata) in table {
            let hash = key
                .parse::<u32>()
                .with_context(|| format!("Manifest key '{key}' is not a numeric hash"))?;
            entries.insert(hash, metadata);
        }
        info!("Loaded {} manifest definitions from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ManifestResolver for StaticManifest {
    fn resolve(&self, hash: u32) -> Option<DisplayMetadata> {
        self.entries.get(&hash).cloned()
    }
}
