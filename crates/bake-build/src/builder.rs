//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};

use bake_cache::{CacheManifest, MANIFEST_FILE, ManifestError, offline_html};
use bake_loader::{LoadError, LoadReport, Loader, LoaderConfig};
use bake_site::{Baker, BakerConfig, Host, normalize_asset_name};
use bake_store::{AssetKind, ContentStore, DriverKind, StoreError};
use sha2::{Digest, Sha256};

/// File name of the site database in the build output.
pub const DATABASE_FILE: &str = "site.db";

/// File name of the generated offline fallback page.
pub const OFFLINE_FILE: &str = "offline.html";

/// Asset kinds copied verbatim into the output under `<tag>/`.
const EMITTED_KINDS: [AssetKind; 3] = [AssetKind::Stylesheet, AssetKind::Script, AssetKind::Other];

/// Length of the cache version tag in hex characters.
const VERSION_LEN: usize = 16;

/// Configuration for static site building.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Content tree root.
    pub content_dir: PathBuf,
    /// Asset tree root.
    pub assets_dir: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Name of per-directory metadata files.
    pub meta_filename: String,
    /// Build pages marked `draft: true`.
    pub drafts: bool,
    /// Site metadata from the config file.
    pub site: serde_json::Map<String, serde_json::Value>,
    /// URL of the offline fallback page.
    pub offline_page: String,
    /// Extra URLs to precache.
    pub precache: Vec<String>,
}

impl BuildConfig {
    /// Create a config with defaults for everything but the directories.
    #[must_use]
    pub fn new(
        content_dir: impl Into<PathBuf>,
        assets_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            assets_dir: assets_dir.into(),
            output_dir: output_dir.into(),
            meta_filename: bake_loader::DEFAULT_META_FILENAME.to_owned(),
            drafts: false,
            site: serde_json::Map::new(),
            offline_page: format!("/{OFFLINE_FILE}"),
            precache: Vec::new(),
        }
    }

    /// Include draft pages.
    #[must_use]
    pub fn with_drafts(mut self, drafts: bool) -> Self {
        self.drafts = drafts;
        self
    }
}

impl From<&bake_config::Config> for BuildConfig {
    fn from(config: &bake_config::Config) -> Self {
        let build = &config.build_resolved;
        Self {
            content_dir: build.content_dir.clone(),
            assets_dir: build.assets_dir.clone(),
            output_dir: build.output_dir.clone(),
            meta_filename: config.metadata.name.clone(),
            drafts: build.drafts,
            site: config.site.clone(),
            offline_page: config.cache.offline_page.clone(),
            precache: config.cache.precache.clone(),
        }
    }
}

/// Error returned by the static site builder.
///
/// Page render failures are not errors; they are counted in the
/// [`BuildReport`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Failed to write cache manifest: {0}")]
    Manifest(#[from] ManifestError),
}

/// A page that failed to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFailure {
    /// Page path.
    pub path: String,
    /// Error description.
    pub message: String,
}

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildReport {
    /// Loader statistics and skipped files.
    pub load: LoadReport,
    /// Pages written successfully.
    pub pages: usize,
    /// Assets copied into the output.
    pub assets: usize,
    /// Pages that failed to render; an error page was written for each.
    pub failures: Vec<PageFailure>,
    /// The written cache manifest.
    pub manifest: CacheManifest,
}

impl BuildReport {
    /// Whether every page rendered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds a static site from a content tree and an asset tree.
pub struct StaticSiteBuilder {
    config: BuildConfig,
}

impl StaticSiteBuilder {
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run the build.
    ///
    /// The site database is recreated from scratch. Every page is rendered
    /// even when earlier pages fail; callers check
    /// [`BuildReport::is_success`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or loaded, or if
    /// an output file cannot be written.
    pub fn build(&self) -> Result<BuildReport, BuildError> {
        let out = &self.config.output_dir;
        fs::create_dir_all(out)?;

        let db_path = out.join(DATABASE_FILE);
        let store = ContentStore::create(&db_path, DriverKind::Accessor)?;
        let load = Loader::new(self.loader_config()).load(&store)?;

        let mut urls = vec!["/".to_owned(), format!("/{DATABASE_FILE}")];
        urls.extend(image_urls(&store)?);
        let assets = self.emit_assets(&store, &mut urls)?;

        let baker = Baker::new(store, BakerConfig::new(Host::Build));
        let (pages, failures) = self.emit_pages(&baker, &mut urls)?;
        // Release the connection before hashing the file.
        drop(baker);

        write_file(&out.join(OFFLINE_FILE), offline_html().as_bytes())?;
        urls.push(format!("/{OFFLINE_FILE}"));
        urls.extend(self.config.precache.iter().cloned());

        let manifest = CacheManifest::new(database_version(&db_path)?, urls)
            .with_offline_page(self.config.offline_page.clone());
        manifest.write(&out.join(MANIFEST_FILE))?;

        tracing::info!(
            pages,
            assets,
            failed = failures.len(),
            version = %manifest.version,
            output = %out.display(),
            "Build finished"
        );

        Ok(BuildReport {
            load,
            pages,
            assets,
            failures,
            manifest,
        })
    }

    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::new(&self.config.content_dir, &self.config.output_dir)
            .with_assets_dir(&self.config.assets_dir)
            .with_meta_filename(&self.config.meta_filename)
            .with_drafts(self.config.drafts)
            .with_site(self.config.site.clone())
    }

    fn emit_assets(
        &self,
        store: &ContentStore,
        urls: &mut Vec<String>,
    ) -> Result<usize, BuildError> {
        let mut count = 0;
        for kind in EMITTED_KINDS {
            for path in store.asset_paths(kind)? {
                let Ok(rel) = normalize_asset_name(&path, kind) else {
                    tracing::warn!(path = %path, kind = %kind, "Skipping asset with invalid path");
                    continue;
                };
                let Some(asset) = store.asset(&path, kind)? else {
                    continue;
                };
                let dest = self.config.output_dir.join(kind.tag()).join(&rel);
                write_file(&dest, &asset.content)?;
                tracing::debug!(path = %rel, kind = %kind, "Copied asset");
                urls.push(format!("/{}/{rel}", kind.tag()));
                count += 1;
            }
        }
        Ok(count)
    }

    fn emit_pages(
        &self,
        baker: &Baker,
        urls: &mut Vec<String>,
    ) -> Result<(usize, Vec<PageFailure>), BuildError> {
        let mut pages = 0;
        let mut failures = Vec::new();

        for path in baker.page_paths()? {
            let Some(page) = baker.get_page(&path) else {
                tracing::warn!(path = %path, "Skipping page with invalid path");
                failures.push(PageFailure {
                    message: "invalid page path".to_owned(),
                    path,
                });
                continue;
            };

            let html = match baker.try_render_page(&page) {
                Ok(html) => {
                    pages += 1;
                    html
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to render page");
                    failures.push(PageFailure {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    baker.render_page(&page)
                }
            };

            write_file(&page_file(&self.config.output_dir, &page.path), html.as_bytes())?;
            urls.push(format!("/{}.html", page.path));
        }

        Ok((pages, failures))
    }
}

/// Output file of a page.
#[must_use]
pub fn page_file(output_dir: &Path, page_path: &str) -> PathBuf {
    output_dir.join(format!("{page_path}.html"))
}

/// Cache version tag of a database file: a SHA-256 prefix of its bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn database_version(path: &Path) -> Result<String, BuildError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let mut version = hex::encode(hasher.finalize());
    version.truncate(VERSION_LEN);
    Ok(version)
}

fn image_urls(store: &ContentStore) -> Result<Vec<String>, BuildError> {
    let mut urls = Vec::new();
    for path in store.asset_paths(AssetKind::Image)? {
        if let Some(asset) = store.asset(&path, AssetKind::Image)? {
            urls.push(asset.text().trim().to_owned());
        }
    }
    Ok(urls)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    };
    write().map_err(|source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Site {
        _temp: tempfile::TempDir,
        root: PathBuf,
    }

    impl Site {
        fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let root = temp.path().to_path_buf();
            let site = Self { _temp: temp, root };
            site.write("assets/templates/page.html", "<h1>{{ page.title }}</h1>");
            site
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn config(&self) -> BuildConfig {
            BuildConfig::new(
                self.root.join("pages"),
                self.root.join("assets"),
                self.root.join("public"),
            )
        }

        fn read(&self, rel: &str) -> String {
            fs::read_to_string(self.root.join("public").join(rel)).unwrap()
        }
    }

    #[test]
    fn test_build_writes_pages() {
        let site = Site::new();
        site.write("pages/index.md", "---\ntitle: Home\n---\nWelcome");
        site.write("pages/about.md", "---\ntitle: About\n---\n");

        let report = StaticSiteBuilder::new(site.config()).build().unwrap();

        assert!(report.is_success());
        assert_eq!(report.pages, 2);
        assert_eq!(site.read("index.html"), "<h1>Home</h1>");
        assert_eq!(site.read("about.html"), "<h1>About</h1>");
        assert!(site.root.join("public/site.db").is_file());
        assert!(site.read(OFFLINE_FILE).contains("offline"));
    }

    #[test]
    fn test_build_continues_after_failure() {
        let site = Site::new();
        site.write("pages/a.md", "---\ntitle: A\ntemplate: missing\n---\n");
        site.write("pages/b.md", "---\ntitle: B\n---\n");

        let report = StaticSiteBuilder::new(site.config()).build().unwrap();

        assert!(!report.is_success());
        assert_eq!(report.pages, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "a");
        assert!(site.read("a.html").contains("missing"));
        assert_eq!(site.read("b.html"), "<h1>B</h1>");
    }

    #[test]
    fn test_unservable_page_path_is_skipped_at_load() {
        let site = Site::new();
        site.write("pages/v1..2.md", "---\ntitle: Old\n---\n");
        site.write("pages/b.md", "---\ntitle: B\n---\n");

        let report = StaticSiteBuilder::new(site.config()).build().unwrap();

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.pages, 1);
        assert_eq!(report.load.failures.len(), 1);
        assert_eq!(report.load.failures[0].message, "invalid page path");
        assert!(!site.root.join("public/v1..2.html").exists());
    }

    #[test]
    fn test_manifest() {
        let site = Site::new();
        site.write("pages/index.md", "---\ntitle: Home\n---\n");
        site.write("pages/images/photo.png", "png");
        site.write("assets/css/site.css", "body {}");
        let mut config = site.config();
        config.precache = vec!["/extra.json".to_owned()];

        let report = StaticSiteBuilder::new(config).build().unwrap();
        let manifest = CacheManifest::read(&site.root.join("public").join(MANIFEST_FILE)).unwrap();

        assert_eq!(manifest, report.manifest);
        assert_eq!(manifest.version.len(), 16);
        assert_eq!(
            manifest.version,
            database_version(&site.root.join("public/site.db")).unwrap()
        );
        assert_eq!(
            manifest.assets,
            vec![
                "/",
                "/css/site.css",
                "/extra.json",
                "/images/photo.png",
                "/index.html",
                "/offline.html",
                "/site.db",
            ]
        );
        assert_eq!(manifest.offline_page.as_deref(), Some("/offline.html"));
        assert_eq!(site.read("css/site.css"), "body {}");
        assert_eq!(site.read("images/photo.png"), "png");
    }

    #[test]
    fn test_drafts() {
        let site = Site::new();
        site.write("pages/wip.md", "---\ntitle: WIP\ndraft: true\n---\n");

        let report = StaticSiteBuilder::new(site.config()).build().unwrap();
        assert_eq!(report.pages, 0);
        assert_eq!(report.load.drafts_skipped, 1);
        assert!(!site.root.join("public/wip.html").exists());

        let report = StaticSiteBuilder::new(site.config().with_drafts(true))
            .build()
            .unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(site.read("wip.html"), "<h1>WIP</h1>");
    }

    #[test]
    fn test_rebuild_replaces_database() {
        let site = Site::new();
        site.write("pages/old.md", "---\ntitle: Old\n---\n");
        StaticSiteBuilder::new(site.config()).build().unwrap();

        fs::remove_file(site.root.join("pages/old.md")).unwrap();
        site.write("pages/new.md", "---\ntitle: New\n---\n");
        let report = StaticSiteBuilder::new(site.config()).build().unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.load.pages, 1);
    }

    #[test]
    fn test_missing_content_dir() {
        let site = Site::new();
        let err = StaticSiteBuilder::new(site.config()).build().unwrap_err();
        assert!(matches!(err, BuildError::Load(LoadError::ContentDirNotFound(_))));
    }

    #[test]
    fn test_from_config() {
        let mut config = bake_config::Config::default_with_base(Path::new("/site"));
        config.cache.offline_page = "/off.html".to_owned();
        let build = BuildConfig::from(&config);
        assert_eq!(build.content_dir, PathBuf::from("/site/pages"));
        assert_eq!(build.output_dir, PathBuf::from("/site/public"));
        assert_eq!(build.meta_filename, "meta.yaml");
        assert_eq!(build.offline_page, "/off.html");
    }
}
