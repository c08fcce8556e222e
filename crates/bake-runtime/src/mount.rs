//! Mounting the site database on a block store.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bake_store::{ContentStore, DriverKind, StoreError};
use tempfile::TempDir;

use crate::block_store::{BlockStore, BlockStoreError};

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const SCRATCH_FILE: &str = "site.db";

/// Mount error.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    /// The database bytes could not be fetched.
    #[error("Failed to fetch database from {source_name}: {error}")]
    Fetch {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    /// Fetched bytes are not a SQLite database.
    #[error("{0} is not a SQLite database")]
    NotADatabase(String),
    /// The block store lost a page of a complete image.
    #[error("Block store is missing page {0}")]
    MissingPage(u64),
    /// Block store failure.
    #[error(transparent)]
    Blocks(#[from] BlockStoreError),
    /// Scratch file failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The database could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where the site database bytes come from.
pub trait DatabaseSource: Send + Sync {
    /// Human-readable origin, for logs and errors.
    fn describe(&self) -> String;

    /// Fetch the whole database file.
    fn fetch(&self) -> std::io::Result<Vec<u8>>;
}

/// Database read from a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatabaseSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Database held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    bytes: Arc<[u8]>,
}

impl BytesSource {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl DatabaseSource for BytesSource {
    fn describe(&self) -> String {
        format!("<{} bytes in memory>", self.bytes.len())
    }

    fn fetch(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

/// What the host environment offers the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The engine may open the block store's backing file in place.
    pub shared_memory: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            shared_memory: true,
        }
    }
}

/// How a mounted database was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Opened in place from the block store's backing file.
    Direct,
    /// Bulk-read into a scratch copy first.
    Scratch,
}

/// A database opened over a block store.
pub struct MountedDatabase {
    store: ContentStore,
    mode: MountMode,
    fetched: bool,
    scratch: Option<TempDir>,
}

impl MountedDatabase {
    #[must_use]
    pub fn mode(&self) -> MountMode {
        self.mode
    }

    /// Whether the bytes had to be fetched from the source.
    #[must_use]
    pub fn fetched(&self) -> bool {
        self.fetched
    }

    /// The store and the scratch directory that must outlive it.
    #[must_use]
    pub fn into_parts(self) -> (ContentStore, Option<TempDir>) {
        (self.store, self.scratch)
    }
}

/// Mount the database image for `version`.
///
/// A complete image for `version` already in `blocks` is reused. Otherwise
/// the bytes are fetched from `source` and written page by page.
///
/// # Errors
///
/// Returns an error if fetching, storing or opening the database fails.
pub fn mount(
    blocks: &dyn BlockStore,
    source: &dyn DatabaseSource,
    version: &str,
    capabilities: HostCapabilities,
) -> Result<MountedDatabase, MountError> {
    let fetched = if blocks.complete_version().as_deref() == Some(version) {
        tracing::debug!(version, "Reusing stored database image");
        false
    } else {
        populate(blocks, source, version)?;
        true
    };

    if capabilities.shared_memory
        && let Some(path) = blocks.backing_file()
    {
        let store = ContentStore::open_read_only(&path, DriverKind::Cursor)?;
        tracing::info!(path = %path.display(), "Mounted database in place");
        return Ok(MountedDatabase {
            store,
            mode: MountMode::Direct,
            fetched,
            scratch: None,
        });
    }

    let bytes = read_image(blocks)?;
    let scratch = TempDir::new()?;
    let path = scratch.path().join(SCRATCH_FILE);
    fs::write(&path, &bytes)?;
    let store = ContentStore::open_read_only(&path, DriverKind::Cursor)?;
    tracing::info!(bytes = bytes.len(), "Mounted database from bulk read");
    Ok(MountedDatabase {
        store,
        mode: MountMode::Scratch,
        fetched,
        scratch: Some(scratch),
    })
}

fn populate(
    blocks: &dyn BlockStore,
    source: &dyn DatabaseSource,
    version: &str,
) -> Result<(), MountError> {
    let source_name = source.describe();
    tracing::info!(source = %source_name, version, "Fetching database image");
    let bytes = source.fetch().map_err(|error| MountError::Fetch {
        source_name: source_name.clone(),
        error,
    })?;
    if !bytes.starts_with(SQLITE_MAGIC) {
        return Err(MountError::NotADatabase(source_name));
    }

    blocks.reset()?;
    for (index, chunk) in (0u64..).zip(bytes.chunks(blocks.page_size())) {
        blocks.write_page(index, chunk)?;
    }
    blocks.mark_complete(version)?;
    Ok(())
}

/// Read every page of the image into one buffer.
fn read_image(blocks: &dyn BlockStore) -> Result<Vec<u8>, MountError> {
    let capacity = usize::try_from(blocks.len()).unwrap_or_default();
    let mut bytes = Vec::with_capacity(capacity);
    for index in 0..blocks.page_count() {
        let page = blocks
            .read_page(index)?
            .ok_or(MountError::MissingPage(index))?;
        bytes.extend_from_slice(&page);
    }
    Ok(bytes)
}
