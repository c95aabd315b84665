//! Model acquisition and local registry.
//!
//! The flow for making a model usable locally is: the [`manager`] asks the
//! [`registry`] whether the model is already Complete; if not it looks the
//! name up in the remote [`manifest`], takes the per-model [`lock`], runs the
//! resumable [`transfer`] into a staging directory, and publishes the result
//! atomically back through the registry.

pub mod lock;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod transfer;

pub use manager::ModelManager;
pub use manifest::{HttpManifestClient, Manifest, ManifestEntry, ManifestSource};
pub use registry::{ModelStatus, Registry, RegistryEntry};
pub use transfer::{HttpTransport, TransferEngine, Transport};

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Parse a human-readable size string ("1MB", "1.5 GB", "512 B") into bytes.
///
/// Binary units (KB = 1024). Returns `None` for anything that doesn't parse
/// cleanly; callers treat that as "size unavailable".
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn parse_bytes(size: &str) -> Option<u64> {
    let trimmed = size.trim();
    let split = trimmed.find(|c: char| c.is_ascii_alphabetic());

    let (number, unit) = match split {
        Some(idx) => (trimmed[..idx].trim(), trimmed[idx..].trim()),
        None => (trimmed, "B"),
    };

    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }

    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" | "K" | "KIB" => 1024,
        "MB" | "M" | "MIB" => 1024 * 1024,
        "GB" | "G" | "GIB" => 1024 * 1024 * 1024,
        _ => return None,
    };

    let bytes = value * multiplier as f64;
    if bytes.fract() != 0.0 {
        return None;
    }
    Some(bytes as u64)
}
