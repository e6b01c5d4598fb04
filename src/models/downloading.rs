// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model weight store: local cache with download on first use
//!
//! Downloads stream into a temporary file in the destination directory and
//! are renamed into place only once complete (and verified, when a checksum
//! is known), so a partial file is never visible at the final path.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub download_dir: PathBuf,
    pub timeout_secs: u64,
    pub verify_checksum: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./models"),
            timeout_secs: 300,
            verify_checksum: true,
        }
    }
}

/// Where a weight file comes from and where it lives in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightSource {
    pub name: String,
    pub url: String,
    /// Path relative to the download directory
    pub filename: String,
    /// Expected lowercase hex SHA-256, if known
    pub sha256: Option<String>,
}

impl WeightSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            filename: filename.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_lowercase());
        self
    }
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub download_time_ms: u64,
    pub checksum: String,
    pub checksum_verified: bool,
    pub source_url: String,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Download of {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Checksum mismatch - expected: {expected}, actual: {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("Downloaded file is empty: {0}")]
    EmptyDownload(String),
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::IoError(e.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        DownloadError::NetworkError(e.to_string())
    }
}

/// Local cache of model weights
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    config: DownloadConfig,
    client: reqwest::Client,
}

impl ModelDownloader {
    pub async fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        tokio::fs::create_dir_all(&config.download_dir).await?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn local_path(&self, source: &WeightSource) -> PathBuf {
        self.config.download_dir.join(&source.filename)
    }

    pub fn is_cached(&self, source: &WeightSource) -> bool {
        std::fs::metadata(self.local_path(source))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Path of the cached file, downloading it first if absent
    pub async fn ensure(&self, source: &WeightSource) -> Result<PathBuf, DownloadError> {
        let path = self.local_path(source);
        if self.is_cached(source) {
            debug!("Using cached {} at {}", source.name, path.display());
            return Ok(path);
        }

        info!("{} not cached, downloading from {}", source.name, source.url);
        let result = self.download(source).await?;
        Ok(result.local_path)
    }

    /// Fetch `source` into the cache, replacing any existing file
    pub async fn download(&self, source: &WeightSource) -> Result<DownloadResult, DownloadError> {
        let dest = self.local_path(source);
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.download_dir.clone());
        tokio::fs::create_dir_all(&parent).await?;

        let start = Instant::now();
        let response = self.client.get(&source.url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                url: source.url.clone(),
                status: response.status().as_u16(),
            });
        }
        debug!("Download size: {:?} bytes", response.content_length());

        // Same directory as the destination so the final rename is atomic
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&parent)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        let mut hasher = Sha256::new();
        let mut size_bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            size_bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if size_bytes == 0 {
            return Err(DownloadError::EmptyDownload(source.url.clone()));
        }

        let checksum = format!("{:x}", hasher.finalize());
        let mut checksum_verified = false;
        if self.config.verify_checksum {
            if let Some(expected) = &source.sha256 {
                if &checksum != expected {
                    warn!("Checksum mismatch for {}", source.name);
                    return Err(DownloadError::ChecksumMismatch {
                        expected: expected.clone(),
                        actual: checksum,
                    });
                }
                checksum_verified = true;
            }
        }

        temp.persist(&dest).map_err(|e| DownloadError::IoError(e.error.to_string()))?;

        let download_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Downloaded {} ({} bytes) to {} in {}ms",
            source.name,
            size_bytes,
            dest.display(),
            download_time_ms
        );

        Ok(DownloadResult {
            local_path: dest,
            size_bytes,
            download_time_ms,
            checksum,
            checksum_verified,
            source_url: source.url.clone(),
        })
    }
}
