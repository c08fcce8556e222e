//! File-based cache storage.
//!
//! [`FileCacheStorage`] keeps every cache in its own directory. Each entry is
//! a file named by the SHA-256 of the request URL, holding a binary header
//! followed by the body:
//!
//! ```text
//! [meta_len: u32 LE][meta JSON: url, status, headers][body bytes]
//! ```
//!
//! On construction the `VERSION` file in the root is checked. A missing or
//! different layout version wipes and recreates the root directory.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CacheBucket, CacheStorage, Response};

/// On-disk layout version.
const LAYOUT_VERSION: &str = "1";

/// File-based [`CacheStorage`] rooted at a directory.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION            # layout version
/// +-- bake-3f2a9c0d/     # cache "bake-3f2a9c0d"
/// |   +-- 8a1f…          # entry for one URL
/// +-- bake-0b7e4f55/
///     +-- ...
/// ```
#[derive(Debug, Clone)]
pub struct FileCacheStorage {
    root: PathBuf,
}

impl FileCacheStorage {
    /// Open the storage at `root`, validating the layout version.
    ///
    /// Errors during validation are logged but never fatal.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        validate_version(&root, LAYOUT_VERSION);
        Self { root }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(escape_name(name))
    }
}

impl CacheStorage for FileCacheStorage {
    fn open(&self, name: &str) -> Box<dyn CacheBucket> {
        let dir = self.cache_dir(name);
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(cache = %name, error = %e, "Failed to create cache directory");
        }
        Box::new(FileCacheBucket { dir })
    }

    fn has(&self, name: &str) -> bool {
        self.cache_dir(name).is_dir()
    }

    fn delete(&self, name: &str) -> bool {
        let dir = self.cache_dir(name);
        if !dir.is_dir() {
            return false;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(cache = %name, error = %e, "Failed to delete cache");
                false
            }
        }
    }

    fn names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| unescape_name(&entry.file_name().to_string_lossy()))
            .collect();
        names.sort();
        names
    }
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
}

/// A single cache backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
}

impl FileCacheBucket {
    fn entry_path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        self.dir.join(hex::encode(hasher.finalize()))
    }
}

fn read_meta(file: &mut File) -> Option<EntryMeta> {
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf).ok()?;
    let meta_len = u32::from_le_bytes(len_buf) as usize;

    let mut meta = vec![0u8; meta_len];
    file.read_exact(&mut meta).ok()?;
    serde_json::from_slice(&meta).ok()
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, url: &str) -> Option<Response> {
        let mut file = File::open(self.entry_path(url)).ok()?;
        let meta = read_meta(&mut file)?;
        if meta.url != url {
            return None;
        }

        let mut body = Vec::new();
        file.read_to_end(&mut body).ok()?;
        Some(Response {
            status: meta.status,
            headers: meta.headers,
            body,
        })
    }

    fn put(&self, url: &str, response: &Response) {
        let meta = EntryMeta {
            url: url.to_owned(),
            status: response.status,
            headers: response.headers.clone(),
        };
        let Ok(meta) = serde_json::to_vec(&meta) else {
            return;
        };
        let Ok(meta_len) = u32::try_from(meta.len()) else {
            return;
        };

        let mut buf = Vec::with_capacity(4 + meta.len() + response.body.len());
        buf.extend_from_slice(&meta_len.to_le_bytes());
        buf.extend_from_slice(&meta);
        buf.extend_from_slice(&response.body);

        // Silently ignore errors; the network stays the source of truth.
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }
        if let Err(e) = fs::write(self.entry_path(url), &buf) {
            tracing::debug!(url, error = %e, "Failed to write cache entry");
        }
    }

    fn delete(&self, url: &str) -> bool {
        fs::remove_file(self.entry_path(url)).is_ok()
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| File::open(entry.path()).ok())
            .filter_map(|mut file| read_meta(&mut file))
            .map(|meta| meta.url)
            .collect();
        keys.sort();
        keys
    }
}

/// Validate the layout version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache layout version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache layout version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}

/// Directory name for a cache name: `%XX`-escapes anything but
/// `[A-Za-z0-9_-]` and a non-leading `.`.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, b) in name.bytes().enumerate() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

fn unescape_name(dir: &str) -> Option<String> {
    let bytes = dir.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = dir.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
