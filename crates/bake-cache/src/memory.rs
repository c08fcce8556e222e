//! In-memory cache storage.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{CacheBucket, CacheStorage, Response};

type Entries = Arc<Mutex<BTreeMap<String, Response>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`CacheStorage`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: Mutex<BTreeMap<String, Entries>>,
}

impl MemoryCacheStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, name: &str) -> Box<dyn CacheBucket> {
        let entries = Arc::clone(lock(&self.caches).entry(name.to_owned()).or_default());
        Box::new(MemoryBucket { entries })
    }

    fn has(&self, name: &str) -> bool {
        lock(&self.caches).contains_key(name)
    }

    fn delete(&self, name: &str) -> bool {
        lock(&self.caches).remove(name).is_some()
    }

    fn names(&self) -> Vec<String> {
        lock(&self.caches).keys().cloned().collect()
    }
}

struct MemoryBucket {
    entries: Entries,
}

impl CacheBucket for MemoryBucket {
    fn get(&self, url: &str) -> Option<Response> {
        lock(&self.entries).get(url).cloned()
    }

    fn put(&self, url: &str, response: &Response) {
        lock(&self.entries).insert(url.to_owned(), response.clone());
    }

    fn delete(&self, url: &str) -> bool {
        lock(&self.entries).remove(url).is_some()
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}
