//! Bundle download.

use crate::error::{ConvergeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Fetches an installation bundle to a local file.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Writes the resource at `url` to `dest` and returns the number of bytes.
    ///
    /// `dest` may be left partially written on error; the caller removes it.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Fetches bundles over HTTP(S), or copies them for `file://` URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose whole request, body included, is bounded by
    /// `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ConvergeError::backend_with_source("Failed to create HTTP client".to_string(), e)
        })?;

        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!(url = %url, "Requesting bundle");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConvergeError::download_with_source(url, "request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConvergeError::download(url, format!("HTTP {}", status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ConvergeError::download_with_source(url, "transfer interrupted", e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;

        Ok(written)
    }
}

#[async_trait]
impl BundleFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let written = if let Some(source) = url.strip_prefix("file://") {
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| ConvergeError::download_with_source(url, "copy failed", e))?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url, dest).await?
        } else {
            return Err(ConvergeError::download(url, "unsupported URL scheme"));
        };

        info!(url = %url, bytes = written, "Downloaded bundle");
        Ok(written)
    }
}
