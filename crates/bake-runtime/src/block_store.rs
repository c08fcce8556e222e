//! Persistent page-addressed block storage.
//!
//! A block store holds one database image split into fixed-size pages plus a
//! completion marker tagged with the image version. A complete image for the
//! expected version is reused across sessions without fetching it again.
//!
//! [`FileBlockStore`] keeps the image as a single file next to a `MANIFEST`:
//!
//! ```text
//! {root}/
//! +-- MANIFEST      # JSON: format, page size, length, completed version
//! +-- image.db      # page-addressed database image
//! ```
//!
//! A manifest with an unknown format or a different page size wipes the
//! directory.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Default page size (the SQLite default).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

const MANIFEST_FILE: &str = "MANIFEST";
const IMAGE_FILE: &str = "image.db";
const FORMAT: u32 = 1;

/// Block store error.
#[derive(Debug, thiserror::Error)]
pub enum BlockStoreError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Page payload larger than the page size.
    #[error("Page {index} is {len} bytes, page size is {page_size}")]
    PageTooLarge {
        index: u64,
        len: usize,
        page_size: usize,
    },
    /// Manifest could not be encoded.
    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Page-addressed storage for one database image.
pub trait BlockStore: Send + Sync {
    /// Size of every page but the last.
    fn page_size(&self) -> usize;

    /// Image length in bytes.
    fn len(&self) -> u64;

    /// Whether the image is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pages covering the image.
    fn page_count(&self) -> u64 {
        self.len().div_ceil(self.page_size() as u64)
    }

    /// Read page `index`; `None` past the end of the image.
    fn read_page(&self, index: u64) -> Result<Option<Vec<u8>>, BlockStoreError>;

    /// Write page `index`. Clears the completion marker.
    fn write_page(&self, index: u64, data: &[u8]) -> Result<(), BlockStoreError>;

    /// Drop the image and the completion marker.
    fn reset(&self) -> Result<(), BlockStoreError>;

    /// Version tag of a completely written image.
    fn complete_version(&self) -> Option<String>;

    /// Mark the current image complete for `version`.
    fn mark_complete(&self, version: &str) -> Result<(), BlockStoreError>;

    /// Contiguous on-disk file holding the image, if any.
    fn backing_file(&self) -> Option<PathBuf>;
}

fn check_page(index: u64, data: &[u8], page_size: usize) -> Result<(), BlockStoreError> {
    if data.len() > page_size {
        return Err(BlockStoreError::PageTooLarge {
            index,
            len: data.len(),
            page_size,
        });
    }
    Ok(())
}

fn page_range(index: u64, page_size: usize, len: u64) -> Option<(u64, usize)> {
    let offset = index.checked_mul(page_size as u64)?;
    if offset >= len {
        return None;
    }
    let size = usize::try_from((len - offset).min(page_size as u64)).ok()?;
    Some((offset, size))
}

#[derive(Default)]
struct MemoryState {
    data: Vec<u8>,
    complete: Option<String>,
}

/// In-memory [`BlockStore`]; nothing survives the process.
pub struct MemoryBlockStore {
    page_size: usize,
    state: Mutex<MemoryState>,
}

impl MemoryBlockStore {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl BlockStore for MemoryBlockStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len(&self) -> u64 {
        self.state().data.len() as u64
    }

    fn read_page(&self, index: u64) -> Result<Option<Vec<u8>>, BlockStoreError> {
        let state = self.state();
        let Some((offset, size)) = page_range(index, self.page_size, state.data.len() as u64)
        else {
            return Ok(None);
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(state.data.get(start..start + size).map(<[u8]>::to_vec))
    }

    fn write_page(&self, index: u64, data: &[u8]) -> Result<(), BlockStoreError> {
        check_page(index, data, self.page_size)?;
        let start = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(self.page_size))
            .ok_or(BlockStoreError::PageTooLarge {
                index,
                len: data.len(),
                page_size: self.page_size,
            })?;
        let mut state = self.state();
        let end = start + data.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(data);
        state.complete = None;
        Ok(())
    }

    fn reset(&self) -> Result<(), BlockStoreError> {
        *self.state() = MemoryState::default();
        Ok(())
    }

    fn complete_version(&self) -> Option<String> {
        self.state().complete.clone()
    }

    fn mark_complete(&self, version: &str) -> Result<(), BlockStoreError> {
        self.state().complete = Some(version.to_owned());
        Ok(())
    }

    fn backing_file(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Manifest {
    format: u32,
    page_size: usize,
    len: u64,
    complete: Option<String>,
}

impl Manifest {
    fn empty(page_size: usize) -> Self {
        Self {
            format: FORMAT,
            page_size,
            len: 0,
            complete: None,
        }
    }
}

/// [`BlockStore`] persisted in a directory.
pub struct FileBlockStore {
    root: PathBuf,
    page_size: usize,
    manifest: Mutex<Manifest>,
}

impl FileBlockStore {
    /// Open or create a block store at `root`.
    ///
    /// A manifest from another format or page size wipes the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the manifest
    /// cannot be written.
    pub fn open(root: impl Into<PathBuf>, page_size: usize) -> Result<Self, BlockStoreError> {
        let root = root.into();
        let manifest = load_manifest(&root, page_size)?;
        let store = Self {
            root,
            page_size,
            manifest: Mutex::new(manifest),
        };
        store.persist(&store.manifest())?;
        Ok(store)
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_path(&self) -> PathBuf {
        self.root.join(IMAGE_FILE)
    }

    fn manifest(&self) -> std::sync::MutexGuard<'_, Manifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, manifest: &Manifest) -> Result<(), BlockStoreError> {
        let json = serde_json::to_vec_pretty(manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

fn load_manifest(root: &Path, page_size: usize) -> Result<Manifest, BlockStoreError> {
    match fs::read(root.join(MANIFEST_FILE)) {
        Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
            Ok(m) if m.format == FORMAT && m.page_size == page_size => {
                tracing::debug!(root = %root.display(), "Block store manifest matches");
                return Ok(m);
            }
            Ok(m) => tracing::info!(
                stored_format = m.format,
                stored_page_size = m.page_size,
                page_size,
                "Block store layout mismatch, wiping"
            ),
            Err(e) => tracing::warn!(error = %e, "Unreadable block store manifest, wiping"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(root = %root.display(), "No block store manifest found, initializing");
        }
        Err(e) => return Err(e.into()),
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!(error = %e, "Failed to remove block store directory");
    }
    fs::create_dir_all(root)?;
    Ok(Manifest::empty(page_size))
}

impl BlockStore for FileBlockStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len(&self) -> u64 {
        self.manifest().len
    }

    fn read_page(&self, index: u64) -> Result<Option<Vec<u8>>, BlockStoreError> {
        let len = self.manifest().len;
        let Some((offset, size)) = page_range(index, self.page_size, len) else {
            return Ok(None);
        };
        let mut file = File::open(self.image_path())?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size];
        file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    fn write_page(&self, index: u64, data: &[u8]) -> Result<(), BlockStoreError> {
        check_page(index, data, self.page_size)?;
        let offset = index * self.page_size as u64;

        let mut manifest = self.manifest();
        if manifest.complete.take().is_some() {
            self.persist(&manifest)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.image_path())?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        manifest.len = manifest.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn reset(&self) -> Result<(), BlockStoreError> {
        let mut manifest = self.manifest();
        File::create(self.image_path())?;
        *manifest = Manifest::empty(self.page_size);
        self.persist(&manifest)
    }

    fn complete_version(&self) -> Option<String> {
        self.manifest().complete.clone()
    }

    fn mark_complete(&self, version: &str) -> Result<(), BlockStoreError> {
        if let Ok(file) = File::open(self.image_path()) {
            file.sync_all()?;
        }
        let mut manifest = self.manifest();
        manifest.complete = Some(version.to_owned());
        self.persist(&manifest)
    }

    fn backing_file(&self) -> Option<PathBuf> {
        Some(self.image_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn BlockStore) {
        assert!(store.is_empty());
        assert_eq!(store.read_page(0).unwrap(), None);

        store.write_page(0, b"abcd").unwrap();
        store.write_page(1, b"ef").unwrap();
        assert_eq!(store.len(), 6);
        assert_eq!(store.page_count(), 2);
        assert_eq!(store.read_page(0).unwrap().unwrap(), b"abcd");
        assert_eq!(store.read_page(1).unwrap().unwrap(), b"ef");
        assert_eq!(store.read_page(2).unwrap(), None);

        assert!(matches!(
            store.write_page(2, b"toolong"),
            Err(BlockStoreError::PageTooLarge { index: 2, .. })
        ));

        store.mark_complete("v1").unwrap();
        assert_eq!(store.complete_version().as_deref(), Some("v1"));

        store.write_page(1, b"gh").unwrap();
        assert_eq!(store.complete_version(), None);

        store.reset().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_block_store() {
        let store = MemoryBlockStore::new(4);
        exercise(&store);
        assert!(store.backing_file().is_none());
    }

    #[test]
    fn test_file_block_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(tmp.path().join("blocks"), 4).unwrap();
        exercise(&store);
        assert_eq!(
            store.backing_file().unwrap(),
            tmp.path().join("blocks").join(IMAGE_FILE)
        );
    }

    #[test]
    fn test_file_block_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        {
            let store = FileBlockStore::open(&root, 4).unwrap();
            store.write_page(0, b"1234").unwrap();
            store.write_page(1, b"5").unwrap();
            store.mark_complete("v7").unwrap();
        }

        let store = FileBlockStore::open(&root, 4).unwrap();
        assert_eq!(store.complete_version().as_deref(), Some("v7"));
        assert_eq!(store.len(), 5);
        assert_eq!(fs::read(store.backing_file().unwrap()).unwrap(), b"12345");
    }

    #[test]
    fn test_file_block_store_page_size_change_wipes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        {
            let store = FileBlockStore::open(&root, 4).unwrap();
            store.write_page(0, b"1234").unwrap();
            store.mark_complete("v1").unwrap();
        }

        let store = FileBlockStore::open(&root, 8).unwrap();
        assert_eq!(store.complete_version(), None);
        assert!(store.is_empty());
        assert!(!root.join(IMAGE_FILE).exists());
    }

    #[test]
    fn test_file_block_store_corrupt_manifest_wipes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(MANIFEST_FILE), "not json").unwrap();

        let store = FileBlockStore::open(&root, 4).unwrap();
        assert!(store.is_empty());
        let manifest: Manifest =
            serde_json::from_slice(&fs::read(root.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest, Manifest::empty(4));
    }
}
