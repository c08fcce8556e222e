//! Cache manifest shared by the build host and the service worker.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CacheConfig;

/// File name of the manifest in the build output.
pub const MANIFEST_FILE: &str = "cache-manifest.json";

/// Manifest error.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid cache manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// Version tag and precache list of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Version tag; changes whenever the site database changes.
    pub version: String,
    /// URLs to precache on install.
    pub assets: Vec<String>,
    /// URL of the offline fallback page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_page: Option<String>,
}

impl CacheManifest {
    #[must_use]
    pub fn new(version: impl Into<String>, mut assets: Vec<String>) -> Self {
        assets.sort();
        assets.dedup();
        Self {
            version: version.into(),
            assets,
            offline_page: None,
        }
    }

    #[must_use]
    pub fn with_offline_page(mut self, url: impl Into<String>) -> Self {
        self.offline_page = Some(url.into());
        self
    }

    /// Read a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the manifest as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }

    /// Service worker configuration for this manifest.
    ///
    /// `offline_page` is used when the manifest names none.
    #[must_use]
    pub fn to_config(&self, prefix: &str, offline_page: &str) -> CacheConfig {
        CacheConfig {
            prefix: prefix.to_owned(),
            version: self.version.clone(),
            precache: self.assets.clone(),
            offline_page: self
                .offline_page
                .clone()
                .unwrap_or_else(|| offline_page.to_owned()),
        }
    }
}
