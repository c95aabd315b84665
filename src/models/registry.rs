//! Local on-disk model registry.
//!
//! The registry exclusively owns the `models/` namespace under the mallow
//! home. A model directory is only considered installed once it carries the
//! completion marker, which is written into the staging directory right
//! before the atomic rename — so the rename itself is the commit point and a
//! crash anywhere in the pipeline leaves the destination either absent or
//! fully Complete.

use crate::config::Config;
use crate::error::{MallowError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sentinel file marking a model directory as fully installed.
pub const COMPLETE_MARKER: &str = ".mallow-complete";

/// Map a model name to a filesystem-friendly directory name.
///
/// Substitution table (stable across versions; changing it orphans
/// previously downloaded models): `:` -> `_`, `/` -> `_`, and any other
/// character outside `[A-Za-z0-9._-]` -> `_`. Names that already contain `_`
/// can collide with a sanitized form; `:` and `-` never collide.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// Installed-or-not state of a model as the registry sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Absent,
    Complete,
}

/// Contents of the completion marker for an installed model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub size_bytes: u64,
    pub downloaded_at: String,
}

/// Registry over the local `models/` directory.
pub struct Registry {
    models_dir: PathBuf,
}

impl Registry {
    /// Open (creating if needed) the registry under the configured home.
    pub fn new(config: &Config) -> Result<Self> {
        let models_dir = config.models_dir();
        fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Final directory a Complete model lives in.
    #[must_use]
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(sanitize(name))
    }

    /// Hidden sibling directory in-flight downloads write into.
    #[must_use]
    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!(".staging-{}", sanitize(name)))
    }

    /// Lock file guarding staging + publish for one model.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!(".{}.lock", sanitize(name)))
    }

    /// Report whether a model is installed.
    ///
    /// A directory without the completion marker is neither Absent nor
    /// Complete; it is surfaced as corrupt state rather than silently
    /// overwritten.
    pub fn status(&self, name: &str) -> Result<ModelStatus> {
        let dir = self.model_path(name);
        if !dir.exists() {
            return Ok(ModelStatus::Absent);
        }
        if dir.join(COMPLETE_MARKER).is_file() {
            return Ok(ModelStatus::Complete);
        }
        Err(MallowError::CorruptState {
            name: name.to_string(),
            path: dir,
        })
    }

    /// Atomically promote a fully-written staging directory to Complete.
    ///
    /// The marker is written and fsynced inside the staging directory first;
    /// the single `rename` then commits marker and data together. Any stray
    /// partial directory at the destination is removed beforehand; a Complete
    /// destination is a conflict (a concurrent publisher won the race).
    pub fn publish(&self, staging: &Path, name: &str, size_bytes: u64) -> Result<RegistryEntry> {
        let dest = self.model_path(name);

        if dest.exists() {
            if dest.join(COMPLETE_MARKER).is_file() {
                return Err(MallowError::Conflict(format!(
                    "Model '{name}' was published concurrently"
                )));
            }
            tracing::warn!(path = %dest.display(), "Removing stray partial directory");
            fs::remove_dir_all(&dest)?;
        }

        let entry = RegistryEntry {
            name: name.to_string(),
            size_bytes,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        };

        let marker_path = staging.join(COMPLETE_MARKER);
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| MallowError::Config(format!("Failed to serialize marker: {e}")))?;
        let mut file = File::create(&marker_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(staging, &dest)?;
        tracing::info!(model = name, path = %dest.display(), "Published model");

        Ok(entry)
    }

    /// Delete a model's directory tree and any staging leftovers.
    ///
    /// Idempotent: removing an absent entry is a no-op.
    pub fn remove(&self, name: &str) -> Result<()> {
        for dir in [self.model_path(name), self.staging_path(name)] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => tracing::info!(path = %dir.display(), "Removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Read the completion marker of an installed model.
    pub fn entry(&self, name: &str) -> Result<Option<RegistryEntry>> {
        match self.status(name)? {
            ModelStatus::Absent => Ok(None),
            ModelStatus::Complete => {
                let marker = self.model_path(name).join(COMPLETE_MARKER);
                let content = fs::read_to_string(&marker)?;
                let entry = serde_json::from_str(&content).map_err(|_| {
                    MallowError::CorruptState {
                        name: name.to_string(),
                        path: self.model_path(name),
                    }
                })?;
                Ok(Some(entry))
            }
        }
    }

    /// Scan the models directory for installed entries.
    ///
    /// Directories without a readable marker (staging areas, corrupt
    /// leftovers) are skipped.
    pub fn installed(&self) -> Result<Vec<RegistryEntry>> {
        let mut entries = Vec::new();

        for dir_entry in fs::read_dir(&self.models_dir)? {
            let path = dir_entry?.path();
            if !path.is_dir() {
                continue;
            }
            let marker = path.join(COMPLETE_MARKER);
            if !marker.is_file() {
                continue;
            }
            match fs::read_to_string(&marker)
                .ok()
                .and_then(|c| serde_json::from_str::<RegistryEntry>(&c).ok())
            {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable marker");
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
