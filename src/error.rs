use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Mallow
#[derive(Error, Debug)]
pub enum MallowError {
    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify the manifest URL in ~/.mallow/config.toml\n- Try again in a moment")]
    Network(String),

    #[error("Malformed manifest: {0}\n\nThe registry returned data that does not match the expected shape. This usually means a server-side problem or a version mismatch; retrying will not help.")]
    Format(String),

    #[error("Model '{name}' not found in the registry.\n\nRun 'mallow list' to see available models.")]
    NotFound { name: String },

    #[error("Transfer failed: {message}")]
    Transfer { message: String, retryable: bool },

    #[error("Publish conflict: {0}")]
    Conflict(String),

    #[error("Another download of '{name}' is already in progress.\n\nWait for it to finish, or re-run this command once it completes.")]
    AlreadyInProgress { name: String },

    #[error("Corrupt local state at {}: directory exists without a completion marker.\n\nRemove it with: mallow remove {name}", .path.display())]
    CorruptState { name: String, path: PathBuf },

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.mallow/config.toml\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MallowError {
    /// Whether re-running the same operation can reasonably succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Transfer { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Shorthand for a retryable transfer failure (staging left resumable).
    pub fn transfer_retryable(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            retryable: true,
        }
    }

    /// Shorthand for a fatal transfer failure (staging discarded).
    pub fn transfer_fatal(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            retryable: false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MallowError>;
