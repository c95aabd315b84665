//! Local generation backend.
//!
//! Validates the on-disk snapshot and answers prompts with a placeholder
//! completion; actual tensor execution belongs to an external runtime.

use crate::error::{MallowError, Result};
use crate::generate::GenerateBackend;
use crate::models::transfer::SNAPSHOT_FILES;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct LocalEngine {
    model_name: String,
    model_dir: PathBuf,
    weights_bytes: u64,
}

impl LocalEngine {
    /// Load a model from a Complete registry directory.
    ///
    /// Fails when the snapshot file set is incomplete, which means the
    /// directory no longer matches what the registry published.
    pub fn load(model_name: &str, model_dir: &Path) -> Result<Self> {
        for file in SNAPSHOT_FILES {
            if !model_dir.join(file).is_file() {
                return Err(MallowError::CorruptState {
                    name: model_name.to_string(),
                    path: model_dir.to_path_buf(),
                });
            }
        }

        let weights_bytes = std::fs::metadata(model_dir.join("model.safetensors"))?.len();
        tracing::info!(
            model = model_name,
            weights_bytes,
            path = %model_dir.display(),
            "Loaded model"
        );

        Ok(Self {
            model_name: model_name.to_string(),
            model_dir: model_dir.to_path_buf(),
            weights_bytes,
        })
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    #[must_use]
    pub fn weights_bytes(&self) -> u64 {
        self.weights_bytes
    }
}

#[async_trait]
impl GenerateBackend for LocalEngine {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!(
            "This is a placeholder response for '{prompt}' using model {}.",
            self.model_name
        ))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}
