//! Configuration for mallow
//!
//! Loads config from `$MALLOW_HOME/config.toml` (default `~/.mallow/config.toml`).
//! Falls back to embedded defaults if the file doesn't exist. Partial configs
//! are merged with defaults using serde's default attributes.
//!
//! The struct is built once at process start and passed by reference into each
//! component constructor.

use crate::error::{MallowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    /// Root directory for all mallow state (models, config, locks)
    #[serde(default = "default_home")]
    pub home: PathBuf,
    /// URL of the remote model manifest
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    /// Base URL the sourceLocator of a manifest entry is resolved against
    #[serde(default = "default_artifact_base_url")]
    pub artifact_base_url: String,
    /// Timeout for a single manifest fetch
    #[serde(default = "default_manifest_timeout_secs")]
    pub manifest_timeout_secs: u64,
    /// How long a second `get` waits on an in-flight download before failing
    #[serde(default = "default_lock_wait_secs")]
    pub lock_wait_secs: u64,
    #[serde(default)]
    pub serve: ServeConfig,
    #[serde(default)]
    pub generate: GenerateConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServeConfig {
    #[serde(default = "default_serve_host")]
    pub host: String,
    #[serde(default = "default_serve_port")]
    pub port: u16,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateConfig {
    /// Generation backend: "local" or "api"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Upstream endpoint for the "api" backend
    pub api_url: Option<String>,
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mallow"))
        .unwrap_or_else(|| PathBuf::from(".mallow"))
}
fn default_manifest_url() -> String {
    "https://raw.githubusercontent.com/42wor/mallow/main/models.json".to_string()
}
fn default_artifact_base_url() -> String {
    "https://huggingface.co".to_string()
}
fn default_manifest_timeout_secs() -> u64 {
    10
}
fn default_lock_wait_secs() -> u64 {
    10
}
fn default_serve_host() -> String {
    "127.0.0.1".to_string()
}
fn default_serve_port() -> u16 {
    11344
}
fn default_backend() -> String {
    "local".to_string()
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_serve_host(),
            port: default_serve_port(),
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_url: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            manifest_url: default_manifest_url(),
            artifact_base_url: default_artifact_base_url(),
            manifest_timeout_secs: default_manifest_timeout_secs(),
            lock_wait_secs: default_lock_wait_secs(),
            serve: ServeConfig::default(),
            generate: GenerateConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, honoring the `MALLOW_HOME` env override.
    pub fn load() -> Result<Self> {
        let home = match std::env::var("MALLOW_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_home(),
        };
        Self::load_from(&home)
    }

    /// Load configuration rooted at an explicit home directory.
    pub fn load_from(home: &Path) -> Result<Self> {
        let config_path = home.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| {
                MallowError::Config(format!(
                    "Failed to parse {}: {e}",
                    config_path.display()
                ))
            })?
        } else {
            Self::default()
        };

        // The directory we found the config in always wins over the `home`
        // key inside the file; anything else makes the root ambiguous.
        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Directory holding installed models and staging areas.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.home.join("models")
    }

    #[must_use]
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    #[must_use]
    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    /// Socket address for the serve command.
    #[must_use]
    pub fn serve_addr(&self) -> String {
        format!("{}:{}", self.serve.host, self.serve.port)
    }
}
