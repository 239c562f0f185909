use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use extern_core::errors::AssetError;

use crate::fetch::{AssetFetcher, ModuleFetcher};

/// Pre-programmed response for one asset path.
#[derive(Clone, Debug)]
pub enum MockAsset {
    Body(String),
    Status(u16),
    /// Wait, then answer with the inner response.
    Delay(Duration, Box<MockAsset>),
}

impl MockAsset {
    pub fn delayed(delay: Duration, inner: MockAsset) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// In-memory fetcher for deterministic tests. Paths without a programmed
/// response succeed with an empty body.
#[derive(Default)]
pub struct MockFetcher {
    assets: Mutex<HashMap<String, MockAsset>>,
    requests: Mutex<Vec<Url>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, asset: MockAsset) -> Self {
        self.assets.lock().insert(path.to_string(), asset);
        self
    }

    pub fn module(self, path: &str, source: &str) -> Self {
        self.with(path, MockAsset::Body(source.to_string()))
    }

    pub fn failing(self, path: &str, status: u16) -> Self {
        self.with(path, MockAsset::Status(status))
    }

    /// Every requested URL, in request order.
    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|u| u.path() == path).count()
    }

    async fn respond(&self, url: &Url) -> Result<String, AssetError> {
        self.requests.lock().push(url.clone());
        let mut asset = self
            .assets
            .lock()
            .get(url.path())
            .cloned()
            .unwrap_or(MockAsset::Body(String::new()));

        loop {
            match asset {
                MockAsset::Body(body) => return Ok(body),
                MockAsset::Status(status) => {
                    return Err(AssetError::Status {
                        url: url.to_string(),
                        status,
                    })
                }
                MockAsset::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    asset = *inner;
                }
            }
        }
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<(), AssetError> {
        self.respond(url).await.map(|_| ())
    }
}

#[async_trait]
impl ModuleFetcher for MockFetcher {
    async fn download(&self, url: &Url) -> Result<String, AssetError> {
        self.respond(url).await
    }
}
