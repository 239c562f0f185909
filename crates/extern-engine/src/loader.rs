use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tracing::Instrument;
use url::Url;

use extern_core::errors::{AssetError, LoadError, LoadPhase};
use extern_core::fragment::Fragment;

use crate::fetch::{AssetFetcher, ModuleFetcher};
use crate::sandbox::ModuleExecutor;

/// Extension that routes an asset to the module executor.
pub const MODULE_EXTENSION: &str = ".js";

type SharedDownload = Shared<BoxFuture<'static, Result<(), AssetError>>>;

/// Strip the parts of `url` that must not reach the CDN.
pub fn cdn_base(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base
}

/// Downloads a fragment's resources in two ordered phases: global
/// dependencies first, then the fragment's own stylesheets and modules.
#[derive(Clone)]
pub struct AssetLoader {
    cdn: Url,
    assets: Arc<dyn AssetFetcher>,
    modules: Arc<dyn ModuleFetcher>,
    executor: Arc<ModuleExecutor>,
    in_flight: Arc<Mutex<HashMap<String, SharedDownload>>>,
}

impl AssetLoader {
    pub fn new(
        cdn: &Url,
        assets: Arc<dyn AssetFetcher>,
        modules: Arc<dyn ModuleFetcher>,
        executor: Arc<ModuleExecutor>,
    ) -> Self {
        Self {
            cdn: cdn_base(cdn),
            assets,
            modules,
            executor,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cdn(&self) -> &Url {
        &self.cdn
    }

    /// Absolute URL for `pathname`: the CDN base with only its path replaced.
    pub fn resolve(&self, pathname: &str) -> Result<Url, AssetError> {
        if self.cdn.cannot_be_a_base() {
            return Err(AssetError::InvalidUrl {
                pathname: pathname.to_string(),
                message: format!("{} cannot be a base", self.cdn),
            });
        }
        let mut url = self.cdn.clone();
        url.set_path(pathname);
        Ok(url)
    }

    /// Load everything `fragment` declares. A dependency failure aborts before
    /// any fragment-local asset is requested.
    pub fn load(&self, fragment: &Fragment) -> BoxFuture<'static, Result<(), LoadError>> {
        let loader = self.clone();
        let name = fragment.name.clone();
        let dependencies: Vec<String> = fragment.dependencies().map(str::to_string).collect();
        let assets: Vec<String> = fragment.assets().map(str::to_string).collect();
        let span = tracing::debug_span!("load", fragment = %name);

        async move {
            loader
                .run_phase(LoadPhase::Dependencies, dependencies)
                .await
                .map_err(|source| LoadError {
                    fragment: name.clone(),
                    phase: LoadPhase::Dependencies,
                    source,
                })?;

            loader
                .run_phase(LoadPhase::Assets, assets)
                .await
                .map_err(|source| LoadError {
                    fragment: name.clone(),
                    phase: LoadPhase::Assets,
                    source,
                })
        }
        .instrument(span)
        .boxed()
    }

    /// Fetch all members concurrently and wait for every one of them.
    /// The error returned is the first to complete.
    async fn run_phase(&self, phase: LoadPhase, pathnames: Vec<String>) -> Result<(), AssetError> {
        if pathnames.is_empty() {
            return Ok(());
        }
        tracing::debug!(%phase, count = pathnames.len(), "loading");

        let mut pending: FuturesUnordered<_> = pathnames.iter().map(|p| self.fetch_one(p)).collect();
        let mut first_error = None;
        while let Some(result) = pending.next().await {
            if let Err(e) = result {
                tracing::debug!(%phase, error = %e, "fetch failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_one(&self, pathname: &str) -> Result<(), AssetError> {
        let url = self.resolve(pathname)?;
        if url.path().ends_with(MODULE_EXTENSION) {
            self.fetch_module(pathname, url).await
        } else {
            tracing::trace!(%url, "fetching asset");
            self.assets.fetch(&url).await
        }
    }

    /// Download and register a view module. Concurrent requests for the same
    /// pathname share one download; registered pathnames are never fetched again.
    async fn fetch_module(&self, pathname: &str, url: Url) -> Result<(), AssetError> {
        if self.executor.contains(pathname) {
            return Ok(());
        }

        let download = self
            .in_flight
            .lock()
            .entry(pathname.to_string())
            .or_insert_with(|| {
                let modules = Arc::clone(&self.modules);
                let executor = Arc::clone(&self.executor);
                let pathname = pathname.to_string();
                async move {
                    tracing::debug!(%url, "downloading module");
                    let source = modules.download(&url).await?;
                    executor.register(&pathname, &source);
                    Ok::<(), AssetError>(())
                }
                .boxed()
                .shared()
            })
            .clone();

        let result = download.clone().await;
        // A later download for the same pathname may already have replaced ours.
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(pathname).is_some_and(|current| current.ptr_eq(&download)) {
            in_flight.remove(pathname);
        }
        result
    }
}
