//! Resumable model transfer into a staging directory.
//!
//! The engine writes exclusively under the staging path its caller owns (the
//! lifecycle controller, which holds the per-model lock). Each snapshot file
//! is fetched through a `.part` cursor: an interrupted attempt leaves the
//! `.part` behind and the next invocation continues from its length when the
//! transport honors range requests. Completed files are committed with a
//! rename and skipped on later attempts, so retries never re-transfer bytes
//! that already made it to disk.

use crate::error::{MallowError, Result};
use crate::models::manifest::ManifestEntry;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// File set fetched for every model snapshot; what the generation loader
/// consumes.
pub const SNAPSHOT_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// One opened remote file stream.
pub struct Fetched {
    /// The remote honored the requested byte offset (range continuation).
    pub resumed: bool,
    /// Absolute file size when the remote reports one (includes any
    /// already-fetched prefix on a resumed stream).
    pub total_len: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

/// Remote byte source for model files.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin fetching `file` from `locator`, starting at byte `offset`.
    ///
    /// A transport that cannot continue from `offset` returns the full body
    /// with `resumed: false`; the engine then restarts that file cleanly.
    async fn fetch(&self, locator: &str, file: &str, offset: u64) -> Result<Fetched>;
}

/// HTTP transport resolving locators against an artifact store.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(3600))
            .build()
            .map_err(|e| MallowError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, locator: &str, file: &str, offset: u64) -> Result<Fetched> {
        let url = format!("{}/{}/resolve/main/{}", self.base_url, locator, file);
        debug!(%url, offset, "Fetching");

        let mut request = self.client.get(&url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| MallowError::transfer_retryable(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {status} for {url}");
            return Err(if status.is_server_error() {
                MallowError::transfer_retryable(message)
            } else {
                MallowError::transfer_fatal(message)
            });
        }

        let resumed = offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let total_len = response
            .content_length()
            .map(|len| if resumed { len + offset } else { len });

        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| {
                    MallowError::transfer_retryable(format!("Stream interrupted: {e}"))
                })
            })
            .boxed();

        Ok(Fetched {
            resumed,
            total_len,
            stream,
        })
    }
}

/// Downloads a model's file set into a staging directory.
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
}

impl TransferEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Transfer all snapshot files for `entry` into `staging`.
    ///
    /// Returns the total bytes on disk for the completed snapshot. On a
    /// retryable failure the staging directory is preserved for resumption;
    /// on a verification failure it is deleted so corrupt data can never be
    /// published.
    pub async fn download(&self, entry: &ManifestEntry, staging: &Path) -> Result<u64> {
        tokio::fs::create_dir_all(staging).await?;

        if let Some(declared) = entry.size_bytes() {
            check_disk_space(staging, declared)?;
        }

        let mut session_received: u64 = 0;
        let mut total_on_disk: u64 = 0;

        for file in SNAPSHOT_FILES {
            let dest = staging.join(file);
            if dest.is_file() {
                let len = tokio::fs::metadata(&dest).await?.len();
                debug!(file, len, "Already transferred, skipping");
                total_on_disk += len;
                continue;
            }

            let written =
                self.fetch_file(entry, staging, file, &mut session_received).await?;
            total_on_disk += written;
        }

        if let Some(declared) = entry.size_bytes() {
            if total_on_disk != declared {
                warn!(
                    model = %entry.name,
                    declared,
                    actual = total_on_disk,
                    "Size verification failed, discarding staging"
                );
                tokio::fs::remove_dir_all(staging).await?;
                return Err(MallowError::transfer_fatal(format!(
                    "Downloaded {} but manifest declares {} for '{}'",
                    super::format_bytes(total_on_disk),
                    super::format_bytes(declared),
                    entry.name
                )));
            }
        }

        info!(
            model = %entry.name,
            bytes = total_on_disk,
            received = session_received,
            "Transfer complete"
        );
        Ok(total_on_disk)
    }

    /// Fetch one file through its `.part` cursor and commit it.
    async fn fetch_file(
        &self,
        entry: &ManifestEntry,
        staging: &Path,
        file: &str,
        session_received: &mut u64,
    ) -> Result<u64> {
        let dest = staging.join(file);
        let part = staging.join(format!("{file}.part"));

        let offset = match tokio::fs::metadata(&part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let fetched = self
            .transport
            .fetch(&entry.source_locator, file, offset)
            .await?;

        let (mut out, mut written) = if offset > 0 && fetched.resumed {
            info!(file, offset, "Resuming transfer");
            let f = tokio::fs::OpenOptions::new().append(true).open(&part).await?;
            (f, offset)
        } else {
            if offset > 0 {
                info!(file, "Remote does not support continuation, restarting");
            }
            (tokio::fs::File::create(&part).await?, 0)
        };

        let bar = progress_bar(file, fetched.total_len, written);
        let mut stream = fetched.stream;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    // keep the .part so the next attempt resumes here
                    bar.abandon();
                    return Err(e);
                }
            };

            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            *session_received += chunk.len() as u64;
            bar.set_position(written);

            if let Some(total) = fetched.total_len {
                if written > total {
                    bar.abandon();
                    tokio::fs::remove_dir_all(staging).await?;
                    return Err(MallowError::transfer_fatal(format!(
                        "Remote sent more bytes than announced for {file}"
                    )));
                }
            }
        }

        out.flush().await?;
        out.sync_all().await?;

        if let Some(total) = fetched.total_len {
            if written < total {
                bar.abandon();
                return Err(MallowError::transfer_retryable(format!(
                    "Connection closed after {written} of {total} bytes for {file}"
                )));
            }
        }

        tokio::fs::rename(&part, &dest).await?;
        bar.finish_and_clear();
        debug!(file, written, "File committed");
        Ok(written)
    }
}

fn progress_bar(file: &str, total: Option<u64>, position: u64) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg:<20} [{bar:30.cyan/blue}] {bytes}/{total_bytes}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
            bar
        }
        None => ProgressBar::new_spinner(),
    };
    bar.set_message(file.to_string());
    bar.set_position(position);
    bar
}

/// Refuse to start a transfer the filesystem cannot hold.
fn check_disk_space(path: &Path, required_bytes: u64) -> Result<()> {
    let stats = nix::sys::statvfs::statvfs(path)
        .map_err(|e| MallowError::Config(format!("Failed to check disk space: {e}")))?;

    let available_bytes = stats.blocks_available() * stats.block_size();

    // 100MB slack so a transfer never fills the disk to the last byte
    let required_with_buffer = required_bytes + (100 * 1_024 * 1_024);

    if available_bytes < required_with_buffer {
        return Err(MallowError::Config(format!(
            "Not enough disk space: {} required, {} available",
            super::format_bytes(required_with_buffer),
            super::format_bytes(available_bytes)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory transport that records every requested (file, offset).
    struct MockTransport {
        files: HashMap<&'static str, Vec<u8>>,
        requests: Mutex<Vec<(String, u64)>>,
        /// Serve ranges (206-style); when false, always send the full body.
        supports_ranges: bool,
        /// Cut the stream for this file after serving N bytes.
        interrupt: Option<(&'static str, usize)>,
    }

    impl MockTransport {
        fn new() -> Self {
            let mut files = HashMap::new();
            files.insert("config.json", b"{}".to_vec());
            files.insert("tokenizer.json", b"tok".to_vec());
            files.insert("model.safetensors", b"weights!".to_vec());
            Self {
                files,
                requests: Mutex::new(Vec::new()),
                supports_ranges: true,
                interrupt: None,
            }
        }

        fn requests(&self) -> Vec<(String, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, _locator: &str, file: &str, offset: u64) -> Result<Fetched> {
            self.requests
                .lock()
                .unwrap()
                .push((file.to_string(), offset));

            let body = self
                .files
                .get(file)
                .cloned()
                .ok_or_else(|| MallowError::transfer_fatal(format!("HTTP 404 for {file}")))?;

            let resumed = offset > 0 && self.supports_ranges;
            let start = if resumed { offset as usize } else { 0 };
            let mut remaining = body[start..].to_vec();

            let mut chunks: Vec<Result<Bytes>> = Vec::new();
            if let Some((target, after)) = self.interrupt {
                if target == file {
                    remaining.truncate(after);
                    chunks.push(Ok(Bytes::from(remaining)));
                    chunks.push(Err(MallowError::transfer_retryable("connection reset")));
                    return Ok(Fetched {
                        resumed,
                        total_len: Some(body.len() as u64),
                        stream: stream::iter(chunks).boxed(),
                    });
                }
            }

            // two chunks to exercise the accumulation path
            let mid = remaining.len() / 2;
            let tail = remaining.split_off(mid);
            chunks.push(Ok(Bytes::from(remaining)));
            chunks.push(Ok(Bytes::from(tail)));

            Ok(Fetched {
                resumed,
                total_len: Some(body.len() as u64),
                stream: stream::iter(chunks).boxed(),
            })
        }
    }

    fn entry(size: &str) -> ManifestEntry {
        ManifestEntry {
            name: "tiny:1b".to_string(),
            description: "d".to_string(),
            size: size.to_string(),
            source_locator: "org/tiny".to_string(),
        }
    }

    // config.json (2) + tokenizer.json (3) + model.safetensors (8)
    const TOTAL: u64 = 13;

    #[tokio::test]
    async fn test_full_download() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        let transport = Arc::new(MockTransport::new());
        let engine = TransferEngine::new(transport.clone());

        let total = engine.download(&entry("13 B"), &staging).await.unwrap();
        assert_eq!(total, TOTAL);

        assert_eq!(
            std::fs::read(staging.join("model.safetensors")).unwrap(),
            b"weights!"
        );
        assert!(!staging.join("model.safetensors.part").exists());
        // every file requested once, from byte zero
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|(_, offset)| *offset == 0));
    }

    #[tokio::test]
    async fn test_interrupted_transfer_preserves_staging() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        let mut transport = MockTransport::new();
        transport.interrupt = Some(("model.safetensors", 5));
        let engine = TransferEngine::new(Arc::new(transport));

        let err = engine.download(&entry("13 B"), &staging).await.unwrap_err();
        assert!(err.is_retryable());

        // completed files committed, interrupted file left as a .part cursor
        assert!(staging.join("config.json").exists());
        assert!(staging.join("tokenizer.json").exists());
        assert!(!staging.join("model.safetensors").exists());
        assert_eq!(
            std::fs::read(staging.join("model.safetensors.part")).unwrap(),
            b"weigh"
        );
    }

    #[tokio::test]
    async fn test_resume_requests_only_remaining_bytes() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");

        // first attempt dies 5 bytes into the weights
        let mut transport = MockTransport::new();
        transport.interrupt = Some(("model.safetensors", 5));
        let engine = TransferEngine::new(Arc::new(transport));
        engine.download(&entry("13 B"), &staging).await.unwrap_err();

        // second attempt resumes from the cursor
        let transport = Arc::new(MockTransport::new());
        let engine = TransferEngine::new(transport.clone());
        let total = engine.download(&entry("13 B"), &staging).await.unwrap();
        assert_eq!(total, TOTAL);
        assert_eq!(
            std::fs::read(staging.join("model.safetensors")).unwrap(),
            b"weights!"
        );

        // only the interrupted file is re-requested, from its offset
        let requests = transport.requests();
        assert_eq!(requests, vec![("model.safetensors".to_string(), 5)]);
    }

    #[tokio::test]
    async fn test_restart_when_remote_lacks_range_support() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("model.safetensors.part"), b"weigh").unwrap();

        let mut transport = MockTransport::new();
        transport.supports_ranges = false;
        let engine = TransferEngine::new(Arc::new(transport));

        let total = engine.download(&entry("13 B"), &staging).await.unwrap();
        assert_eq!(total, TOTAL);
        // clean restart produced the correct bytes, not a doubled prefix
        assert_eq!(
            std::fs::read(staging.join("model.safetensors")).unwrap(),
            b"weights!"
        );
    }

    #[tokio::test]
    async fn test_size_mismatch_discards_staging() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        let engine = TransferEngine::new(Arc::new(MockTransport::new()));

        let err = engine.download(&entry("999 B"), &staging).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_unparseable_size_skips_verification() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        let engine = TransferEngine::new(Arc::new(MockTransport::new()));

        let total = engine.download(&entry("pretty big"), &staging).await.unwrap();
        assert_eq!(total, TOTAL);
    }

    #[tokio::test]
    async fn test_completed_files_are_not_refetched() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging-tiny_1b");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("config.json"), b"{}").unwrap();
        std::fs::write(staging.join("tokenizer.json"), b"tok").unwrap();

        let transport = Arc::new(MockTransport::new());
        let engine = TransferEngine::new(transport.clone());
        let total = engine.download(&entry("13 B"), &staging).await.unwrap();

        assert_eq!(total, TOTAL);
        let requests = transport.requests();
        assert_eq!(requests, vec![("model.safetensors".to_string(), 0)]);
    }
}
