//! Offline cache layer for Bake.
//!
//! A versioned cache namespace holds the precached asset list plus HTML
//! pages accumulated while browsing. Two traits decouple the
//! [`ServiceWorker`] from where responses are kept:
//!
//! - [`CacheStorage`]: factory and registry of named caches
//! - [`CacheBucket`]: one named cache, request URL to stored response
//!
//! # Implementations
//!
//! - [`MemoryCacheStorage`]: in-process maps
//! - [`FileCacheStorage`]: one directory per cache with a layout version
//!
//! # Example
//!
//! ```
//! use bake_cache::{CacheStorage, MemoryCacheStorage, Response};
//!
//! let storage = MemoryCacheStorage::new();
//! let cache = storage.open("bake-v1");
//! cache.put("/", &Response::html("<h1>Home</h1>"));
//! assert_eq!(cache.get("/").unwrap().text(), "<h1>Home</h1>");
//! assert_eq!(storage.names(), vec!["bake-v1"]);
//! ```

mod file;
mod http;
mod manifest;
mod memory;
mod network;
mod worker;

pub use file::FileCacheStorage;
pub use http::{Request, RequestMode, Response};
pub use manifest::{CacheManifest, MANIFEST_FILE, ManifestError};
pub use memory::MemoryCacheStorage;
pub use network::{FetchError, Network};
pub use worker::{CacheConfig, CacheError, OFFLINE_STATUS, ServiceWorker, offline_html};

/// One named cache mapping request URLs to responses.
pub trait CacheBucket: Send + Sync {
    /// Stored response for `url`.
    fn get(&self, url: &str) -> Option<Response>;

    /// Store `response` for `url`, replacing any previous entry.
    fn put(&self, url: &str, response: &Response);

    /// Remove the entry for `url`. Returns whether one existed.
    fn delete(&self, url: &str) -> bool;

    /// URLs with a stored response, sorted.
    fn keys(&self) -> Vec<String>;
}

/// Registry of named [`CacheBucket`]s.
pub trait CacheStorage: Send + Sync {
    /// Open or create the cache `name`.
    ///
    /// Handles opened with the same name share their entries.
    fn open(&self, name: &str) -> Box<dyn CacheBucket>;

    /// Whether the cache `name` exists.
    fn has(&self, name: &str) -> bool;

    /// Delete the cache `name` with all its entries.
    fn delete(&self, name: &str) -> bool;

    /// Names of existing caches, sorted.
    fn names(&self) -> Vec<String>;
}
