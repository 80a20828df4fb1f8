//! HTTP client implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, error};

use crate::errors::OpsError;
use crate::filesys::file::File;

/// Downloads the upstream descriptor
#[async_trait]
pub trait DescriptorFetcher: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &File) -> Result<u64, OpsError>;
}

/// HTTP client for release asset downloads
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self, OpsError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stackop/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DescriptorFetcher for HttpClient {
    async fn download(&self, url: &str, dest: &File) -> Result<u64, OpsError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/octet-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!("HTTP GET failed: {} - {}", url, status);
            return Err(OpsError::FetchError(format!("{}: {}", url, status)));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(OpsError::FetchError(format!("{}: empty response body", url)));
        }

        dest.write_bytes(&body).await?;
        Ok(body.len() as u64)
    }
}
