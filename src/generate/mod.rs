pub mod api;
pub mod local;

use crate::config::GenerateConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub use api::ApiEngine;
pub use local::LocalEngine;

/// Unified interface for generation backends.
///
/// Backends receive the path of a Complete model from the lifecycle
/// controller; they never touch the registry themselves.
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Name of the model this backend answers for.
    fn model_name(&self) -> &str;

    /// Get backend name for logging/debugging
    fn backend_name(&self) -> &str;
}

/// Backend enum wrapper for dynamic dispatch
pub enum Engine {
    Local(LocalEngine),
    Api(ApiEngine),
}

impl Engine {
    /// Create backend from config, loading `model_name` from `model_dir`.
    pub fn from_config(
        config: &GenerateConfig,
        model_name: &str,
        model_dir: &Path,
    ) -> Result<Self> {
        match config.backend.as_str() {
            "local" => Ok(Self::Local(LocalEngine::load(model_name, model_dir)?)),
            "api" => Ok(Self::Api(ApiEngine::new(model_name, config)?)),
            other => Err(crate::error::MallowError::Config(format!(
                "Unknown generate backend: {other}. Must be 'local' or 'api'"
            ))),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match self {
            Self::Local(b) => b.generate(prompt).await,
            Self::Api(b) => b.generate(prompt).await,
        }
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        match self {
            Self::Local(b) => b.model_name(),
            Self::Api(b) => b.model_name(),
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        match self {
            Self::Local(b) => b.backend_name(),
            Self::Api(b) => b.backend_name(),
        }
    }
}
