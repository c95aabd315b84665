//! Model lifecycle controller.
//!
//! `ensure` is the one entry point commands use to make a model locally
//! present: registry check, manifest lookup, locked transfer, publish.

use crate::config::Config;
use crate::error::{MallowError, Result};
use crate::models::lock::ModelLock;
use crate::models::manifest::{HttpManifestClient, Manifest, ManifestSource};
use crate::models::registry::{ModelStatus, Registry};
use crate::models::transfer::{HttpTransport, TransferEngine, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MANIFEST_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Orchestrates "model present locally" across registry, manifest and
/// transfer engine.
pub struct ModelManager {
    registry: Registry,
    manifest_source: Arc<dyn ManifestSource>,
    engine: TransferEngine,
    lock_wait: Duration,
}

impl ModelManager {
    /// Wire the production manager: HTTP manifest client + HTTP transport.
    pub fn new(config: &Config) -> Result<Self> {
        let manifest_source: Arc<dyn ManifestSource> =
            Arc::new(HttpManifestClient::new(config)?);
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.artifact_base_url)?);
        Self::with_sources(config, manifest_source, transport)
    }

    /// Construction seam for substituting manifest source and transport.
    pub fn with_sources(
        config: &Config,
        manifest_source: Arc<dyn ManifestSource>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Ok(Self {
            registry: Registry::new(config)?,
            manifest_source,
            engine: TransferEngine::new(transport),
            lock_wait: config.lock_wait(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fetch a fresh manifest snapshot, retrying once on a transient
    /// network failure. Format errors are never retried.
    pub async fn manifest(&self) -> Result<Manifest> {
        match self.manifest_source.fetch().await {
            Ok(manifest) => Ok(manifest),
            Err(MallowError::Network(first)) => {
                warn!(error = %first, "Manifest fetch failed, retrying once");
                tokio::time::sleep(MANIFEST_RETRY_BACKOFF).await;
                self.manifest_source.fetch().await
            }
            Err(e) => Err(e),
        }
    }

    /// Make `name` locally present and return its directory.
    ///
    /// Re-running on an already-downloaded model is a cheap no-op with zero
    /// network calls. Otherwise the name is resolved against a fresh
    /// manifest, transferred into staging under the per-model lock, and
    /// published atomically.
    pub async fn ensure(&self, name: &str) -> Result<PathBuf> {
        if self.registry.status(name)? == ModelStatus::Complete {
            info!(model = name, "Already present locally");
            return Ok(self.registry.model_path(name));
        }

        let manifest = self.manifest().await?;
        let entry = manifest
            .find(name)
            .ok_or_else(|| MallowError::NotFound {
                name: name.to_string(),
            })?
            .clone();

        let _lock = ModelLock::acquire(&self.registry, name, self.lock_wait).await?;

        // another invocation may have published while we waited on the lock
        if self.registry.status(name)? == ModelStatus::Complete {
            info!(model = name, "Published by a concurrent invocation");
            return Ok(self.registry.model_path(name));
        }

        let staging = self.registry.staging_path(name);
        let total = self.engine.download(&entry, &staging).await?;
        self.registry.publish(&staging, name, total)?;

        Ok(self.registry.model_path(name))
    }
}
