//! Remote model manifest.
//!
//! The manifest is a JSON object with a `models` array; each entry describes
//! one downloadable model. It is re-fetched on every command and never
//! persisted locally.

use crate::config::Config;
use crate::error::{MallowError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Descriptor of one remote-known model.
///
/// Immutable once fetched. All fields are required; a manifest that omits one
/// is rejected as malformed rather than patched over.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
    /// Human-readable size string, e.g. "1MB"
    pub size: String,
    /// Opaque remote repository/path identifier
    #[serde(rename = "sourceLocator")]
    pub source_locator: String,
}

impl ManifestEntry {
    /// Declared size in bytes, when the size string parses exactly.
    #[must_use]
    pub fn size_bytes(&self) -> Option<u64> {
        super::parse_bytes(&self.size)
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    models: Vec<ManifestEntry>,
}

/// One fetched snapshot of the remote catalog.
///
/// Keeps the manifest's ordering for display and a name index for lookup.
/// Duplicate names are a data-quality issue, not an error: the first
/// occurrence wins.
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    #[must_use]
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            index.entry(entry.name.clone()).or_insert(i);
        }
        Self { entries, index }
    }

    /// Parse a manifest body, failing with `Format` on any shape violation.
    pub fn from_json(body: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(body)
            .map_err(|e| MallowError::Format(e.to_string()))?;
        Ok(Self::from_entries(raw.models))
    }

    /// Exact-match lookup by name (case-sensitive).
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ManifestEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of manifest snapshots.
///
/// The lifecycle controller only depends on this seam; tests substitute a
/// static source.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch a fresh manifest snapshot. No caching between calls.
    async fn fetch(&self) -> Result<Manifest>;
}

/// Manifest client backed by a plain HTTP GET.
pub struct HttpManifestClient {
    client: reqwest::Client,
    url: String,
}

impl HttpManifestClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.manifest_timeout())
            .build()
            .map_err(|e| MallowError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.manifest_url.clone(),
        })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestClient {
    async fn fetch(&self) -> Result<Manifest> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MallowError::Network(format!("Could not fetch model manifest: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MallowError::Network(format!(
                "Manifest server returned HTTP {status} for {}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MallowError::Network(format!("Failed to read manifest body: {e}")))?;

        Manifest::from_json(&body)
    }
}
