use async_trait::async_trait;
use url::Url;

use extern_core::errors::AssetError;

/// Downloads non-code assets (stylesheets, images, ...).
/// Implementations are expected to deduplicate by absolute URL.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<(), AssetError>;
}

/// Downloads view-module source text.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn download(&self, url: &Url) -> Result<String, AssetError>;
}
