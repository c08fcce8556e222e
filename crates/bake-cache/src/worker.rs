//! Cache-first service worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;

use crate::{CacheBucket, CacheStorage, FetchError, Network, Request, Response};

/// Status of the built-in offline page.
pub const OFFLINE_STATUS: u16 = 503;

/// Service worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache name prefix shared by all versions.
    pub prefix: String,
    /// Current version tag.
    pub version: String,
    /// URLs stored on install.
    pub precache: Vec<String>,
    /// URL of the offline fallback page.
    pub offline_page: String,
}

impl CacheConfig {
    /// Name of the current cache: `<prefix><version>`.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}{}", self.prefix, self.version)
    }
}

/// Install failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to precache {url}: {source}")]
    Precache {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("Failed to precache {url}: status {status}")]
    Status { url: String, status: u16 },
}

/// Built-in offline page, used when none is cached.
#[must_use]
pub fn offline_html() -> String {
    concat!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n",
        "<meta charset=\"utf-8\">\n<title>Offline</title>\n",
        "</head>\n<body>\n<h1>You are offline</h1>\n",
        "<p>This page has not been saved for offline reading yet.</p>\n",
        "</body>\n</html>\n",
    )
    .to_owned()
}

/// Service worker over a cache storage and a network.
pub struct ServiceWorker<N: Network> {
    config: CacheConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<N>,
    clients_claimed: AtomicBool,
    background: Mutex<JoinSet<()>>,
}

impl<N: Network> ServiceWorker<N> {
    #[must_use]
    pub fn new(config: CacheConfig, storage: Arc<dyn CacheStorage>, network: Arc<N>) -> Self {
        Self {
            config,
            storage,
            network,
            clients_claimed: AtomicBool::new(false),
            background: Mutex::new(JoinSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn cache(&self) -> Box<dyn CacheBucket> {
        self.storage.open(&self.config.cache_name())
    }

    /// Store every precache URL in the current cache.
    ///
    /// # Errors
    ///
    /// Fails on the first URL that cannot be fetched or answers with a
    /// non-success status; the service worker is then not installed.
    pub async fn install(&self) -> Result<(), CacheError> {
        let cache = self.cache();
        for url in &self.config.precache {
            let response = self
                .network
                .fetch(&Request::get(url.clone()))
                .await
                .map_err(|source| CacheError::Precache {
                    url: url.clone(),
                    source,
                })?;
            if !response.is_success() {
                return Err(CacheError::Status {
                    url: url.clone(),
                    status: response.status,
                });
            }
            cache.put(url, &response);
        }
        tracing::info!(
            cache = %self.config.cache_name(),
            count = self.config.precache.len(),
            "Precached assets"
        );
        Ok(())
    }

    /// Delete every cache but the current one and claim open clients.
    ///
    /// Returns the deleted cache names.
    pub fn activate(&self) -> Vec<String> {
        let current = self.config.cache_name();
        let deleted: Vec<String> = self
            .storage
            .names()
            .into_iter()
            .filter(|name| *name != current)
            .filter(|name| self.storage.delete(name))
            .collect();
        if !deleted.is_empty() {
            tracing::info!(?deleted, "Deleted stale caches");
        }
        self.clients_claimed.store(true, Ordering::Release);
        deleted
    }

    /// Whether `activate` has claimed the open clients.
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    /// Answer `request` cache-first.
    ///
    /// HTML cache hits are revalidated in the background. HTML responses
    /// fetched on a miss are stored. Without network or cache entry, HTML
    /// requests get the offline page.
    ///
    /// # Errors
    ///
    /// Returns the network error for non-HTML requests that miss the cache.
    pub async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let cache = self.cache();
        let wants_html = request.wants_html();

        if let Some(hit) = cache.get(&request.url) {
            tracing::debug!(url = %request.url, "Cache hit");
            if wants_html {
                self.revalidate(request);
            }
            return Ok(hit);
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if wants_html && response.is_success() && response.is_html() {
                    cache.put(&request.url, &response);
                }
                Ok(response)
            }
            Err(e) if wants_html => {
                tracing::debug!(url = %request.url, error = %e, "Serving offline page");
                Ok(self.offline_response(cache.as_ref()))
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for all background revalidations started so far.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        while tasks.join_next().await.is_some() {}
    }

    fn offline_response(&self, cache: &dyn CacheBucket) -> Response {
        cache
            .get(&self.config.offline_page)
            .unwrap_or_else(|| {
                let mut response = Response::html(offline_html());
                response.status = OFFLINE_STATUS;
                response
            })
    }

    fn revalidate(&self, request: Request) {
        let network = Arc::clone(&self.network);
        let storage = Arc::clone(&self.storage);
        let name = self.config.cache_name();

        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                match network.fetch(&request).await {
                    Ok(response) if response.is_success() => {
                        storage.open(&name).put(&request.url, &response);
                        tracing::debug!(url = %request.url, "Revalidated cache entry");
                    }
                    Ok(response) => {
                        tracing::debug!(url = %request.url, status = response.status, "Revalidation skipped");
                    }
                    Err(e) => {
                        tracing::debug!(url = %request.url, error = %e, "Revalidation failed");
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::MemoryCacheStorage;

    #[derive(Default)]
    struct FakeNetwork {
        online: AtomicBool,
        routes: Mutex<HashMap<String, Response>>,
        hits: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn online() -> Arc<Self> {
            let network = Self::default();
            network.online.store(true, Ordering::SeqCst);
            Arc::new(network)
        }

        fn serve(&self, url: &str, response: Response) {
            self.routes.lock().unwrap().insert(url.to_owned(), response);
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    impl Network for FakeNetwork {
        fn fetch(
            &self,
            request: &Request,
        ) -> impl Future<Output = Result<Response, FetchError>> + Send {
            let result = if self.online.load(Ordering::SeqCst) {
                self.hits.lock().unwrap().push(request.url.clone());
                Ok(self
                    .routes
                    .lock()
                    .unwrap()
                    .get(&request.url)
                    .cloned()
                    .unwrap_or_else(|| Response::new(404, "")))
            } else {
                Err(FetchError::Offline)
            };
            async move { result }
        }
    }

    fn config(version: &str) -> CacheConfig {
        CacheConfig {
            prefix: "bake-".to_owned(),
            version: version.to_owned(),
            precache: vec!["/".to_owned(), "/site.db".to_owned()],
            offline_page: "/offline.html".to_owned(),
        }
    }

    fn worker(
        version: &str,
        storage: &Arc<MemoryCacheStorage>,
        network: &Arc<FakeNetwork>,
    ) -> ServiceWorker<FakeNetwork> {
        let storage: Arc<dyn CacheStorage> = Arc::clone(storage) as Arc<dyn CacheStorage>;
        ServiceWorker::new(config(version), storage, Arc::clone(network))
    }

    fn site_network() -> Arc<FakeNetwork> {
        let network = FakeNetwork::online();
        network.serve("/", Response::html("<h1>Home</h1>"));
        network.serve(
            "/site.db",
            Response::new(200, "db").with_header("content-type", "application/x-sqlite3"),
        );
        network
    }

    #[tokio::test]
    async fn test_install_precaches() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = site_network();
        let sw = worker("v1", &storage, &network);

        sw.install().await.unwrap();

        assert_eq!(storage.open("bake-v1").keys(), vec!["/", "/site.db"]);
    }

    #[tokio::test]
    async fn test_install_fails_on_missing_asset() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = FakeNetwork::online();
        let sw = worker("v1", &storage, &network);

        let err = sw.install().await.unwrap_err();
        assert!(matches!(err, CacheError::Status { status: 404, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_activate_keeps_only_current_cache() {
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.open("bake-v0");
        storage.open("unrelated");
        let network = site_network();
        let sw = worker("v1", &storage, &network);
        sw.install().await.unwrap();

        let deleted = sw.activate();

        assert_eq!(deleted, vec!["bake-v0", "unrelated"]);
        assert_eq!(storage.names(), vec!["bake-v1"]);
        assert!(sw.clients_claimed());
    }

    #[tokio::test]
    async fn test_cache_hit_serves_cached_and_revalidates_html() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = site_network();
        let sw = worker("v1", &storage, &network);
        sw.install().await.unwrap();
        network.serve("/", Response::html("<h1>Fresh</h1>"));

        let response = sw.fetch(Request::navigate("/")).await.unwrap();
        assert_eq!(response.text(), "<h1>Home</h1>");

        sw.settle().await;
        let cached = storage.open("bake-v1").get("/").unwrap();
        assert_eq!(cached.text(), "<h1>Fresh</h1>");
    }

    #[tokio::test]
    async fn test_non_html_hit_is_not_revalidated() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = site_network();
        let sw = worker("v1", &storage, &network);
        sw.install().await.unwrap();
        let before = network.hits().len();

        let response = sw.fetch(Request::get("/site.db")).await.unwrap();
        sw.settle().await;

        assert_eq!(response.body, b"db");
        assert_eq!(network.hits().len(), before);
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_entry() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = site_network();
        let sw = worker("v1", &storage, &network);
        sw.install().await.unwrap();
        network.set_online(false);

        let response = sw.fetch(Request::navigate("/")).await.unwrap();
        sw.settle().await;

        assert_eq!(response.text(), "<h1>Home</h1>");
        assert_eq!(
            storage.open("bake-v1").get("/").unwrap().text(),
            "<h1>Home</h1>"
        );
    }

    #[tokio::test]
    async fn test_miss_stores_html_only() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = site_network();
        network.serve("/about", Response::html("<p>About</p>"));
        network.serve(
            "/style.css",
            Response::new(200, "body{}").with_header("content-type", "text/css"),
        );
        let sw = worker("v1", &storage, &network);

        sw.fetch(Request::navigate("/about")).await.unwrap();
        sw.fetch(Request::get("/style.css")).await.unwrap();
        let missing = sw.fetch(Request::navigate("/missing")).await.unwrap();

        assert_eq!(missing.status, 404);
        assert_eq!(storage.open("bake-v1").keys(), vec!["/about"]);
    }

    #[tokio::test]
    async fn test_offline_html_without_cache_gets_offline_page() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(FakeNetwork::default());
        let sw = worker("v1", &storage, &network);

        let response = sw.fetch(Request::navigate("/never-seen")).await.unwrap();

        assert_eq!(response.status, OFFLINE_STATUS);
        assert_eq!(response.text(), offline_html());
    }

    #[tokio::test]
    async fn test_offline_uses_cached_offline_page() {
        let storage = Arc::new(MemoryCacheStorage::new());
        storage
            .open("bake-v1")
            .put("/offline.html", &Response::html("<p>custom offline</p>"));
        let network = Arc::new(FakeNetwork::default());
        let sw = worker("v1", &storage, &network);

        let response = sw.fetch(Request::navigate("/x")).await.unwrap();
        assert_eq!(response.text(), "<p>custom offline</p>");
    }

    #[tokio::test]
    async fn test_offline_non_html_propagates() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(FakeNetwork::default());
        let sw = worker("v1", &storage, &network);

        let err = sw.fetch(Request::get("/app.js")).await.unwrap_err();
        assert_eq!(err, FetchError::Offline);
    }
}
