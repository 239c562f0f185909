use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use url::Url;

use extern_core::errors::AssetError;
use extern_engine::fetch::{AssetFetcher, ModuleFetcher};

/// reqwest-backed fetcher for both asset kinds. Every request is bounded by
/// `timeout`. Asset bodies are kept by URL; each URL is downloaded at most
/// once successfully, failed downloads may be retried.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    timeout: Duration,
    bodies: DashMap<String, Arc<OnceCell<Bytes>>>,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            bodies: DashMap::new(),
        }
    }

    /// Body of a previously fetched asset.
    pub fn body(&self, url: &str) -> Option<Bytes> {
        self.bodies.get(url).and_then(|cell| cell.get().cloned())
    }

    /// URLs with a downloaded body, sorted.
    pub fn cached_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .bodies
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        urls.sort();
        urls
    }

    async fn get(&self, url: &Url) -> Result<Bytes, AssetError> {
        let to_error = |e: reqwest::Error| {
            if e.is_timeout() {
                AssetError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                }
            } else {
                AssetError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(to_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(to_error)
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &Url) -> Result<(), AssetError> {
        let cell = self.bodies.entry(url.to_string()).or_default().clone();
        cell.get_or_try_init(|| async {
            tracing::debug!(%url, "downloading asset");
            self.get(url).await
        })
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl ModuleFetcher for HttpAssetFetcher {
    async fn download(&self, url: &Url) -> Result<String, AssetError> {
        let body = self.get(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
