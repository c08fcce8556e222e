//! Loader pipeline: content tree and asset tree into the content store.

use std::path::{Path, PathBuf};

use bake_store::{Asset, AssetKind, ContentStore, SITE_META_PATH, validate_page_path};

use crate::assets::{AssetFile, read_site_source, scan_assets, site_asset};
use crate::error::{FileError, LoadError};
use crate::metadata::{Metadata, is_draft};
use crate::mixer::{Mixed, copy_image, mix};
use crate::scanner::Scanner;

/// Default name of directory metadata files.
pub const DEFAULT_META_FILENAME: &str = "meta.yaml";

/// Configuration for [`Loader`].
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Content tree root.
    pub content_dir: PathBuf,
    /// Asset tree root; skipped when `None`.
    pub assets_dir: Option<PathBuf>,
    /// Build output root (images are copied under `images/`).
    pub output_dir: PathBuf,
    /// Name of per-directory metadata files.
    pub meta_filename: String,
    /// Load pages marked `draft: true`.
    pub include_drafts: bool,
    /// Site metadata overriding the site data file.
    pub site: Metadata,
}

impl LoaderConfig {
    /// Create a config with defaults for everything but the roots.
    #[must_use]
    pub fn new(content_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            assets_dir: None,
            output_dir: output_dir.into(),
            meta_filename: DEFAULT_META_FILENAME.to_owned(),
            include_drafts: false,
            site: Metadata::new(),
        }
    }

    /// Set the asset tree root.
    #[must_use]
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    /// Set the metadata file name.
    #[must_use]
    pub fn with_meta_filename(mut self, name: impl Into<String>) -> Self {
        self.meta_filename = name.into();
        self
    }

    /// Include draft pages.
    #[must_use]
    pub fn with_drafts(mut self, include: bool) -> Self {
        self.include_drafts = include;
        self
    }

    /// Set site metadata overrides.
    #[must_use]
    pub fn with_site(mut self, site: Metadata) -> Self {
        self.site = site;
        self
    }
}

/// A file that failed to load and was skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadFailure {
    /// Source file path.
    pub path: PathBuf,
    /// Error description.
    pub message: String,
}

/// Outcome of a load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Pages inserted.
    pub pages: usize,
    /// Assets inserted (including image references and site metadata).
    pub assets: usize,
    /// Draft pages skipped.
    pub drafts_skipped: usize,
    /// Per-file failures.
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    fn fail(&mut self, path: &Path, err: &FileError) {
        tracing::warn!(path = %path.display(), error = %err, "Skipping file");
        self.failures.push(LoadFailure {
            path: path.to_path_buf(),
            message: err.to_string(),
        });
    }
}

/// Fills a [`ContentStore`] from a content tree and an asset tree.
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load both trees into `store` inside one transaction.
    ///
    /// Errors on individual files are logged, recorded in the report, and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ContentDirNotFound`] if the content root is
    /// missing, or a store error if the transaction itself fails.
    pub fn load(&self, store: &ContentStore) -> Result<LoadReport, LoadError> {
        if !self.config.content_dir.is_dir() {
            return Err(LoadError::ContentDirNotFound(self.config.content_dir.clone()));
        }

        store.transaction(|store| {
            let mut report = LoadReport::default();
            self.load_content(store, &mut report);
            self.load_assets(store, &mut report);
            tracing::info!(
                pages = report.pages,
                assets = report.assets,
                drafts_skipped = report.drafts_skipped,
                failures = report.failures.len(),
                "Loaded content"
            );
            Ok(report)
        })
    }

    fn load_content(&self, store: &ContentStore, report: &mut LoadReport) {
        let scanner = Scanner::new(&self.config.content_dir, &self.config.meta_filename);
        for file in scanner.scan() {
            let result = mix(&file, &self.config.output_dir).and_then(|mixed| match mixed {
                Mixed::Page(page) => {
                    if validate_page_path(&page.path).is_none() {
                        return Err(FileError::InvalidPagePath);
                    }
                    if !self.config.include_drafts && is_draft(&page.data) {
                        tracing::debug!(path = %page.path, "Skipping draft");
                        report.drafts_skipped += 1;
                        return Ok(());
                    }
                    store.insert_page(&page)?;
                    report.pages += 1;
                    Ok(())
                }
                Mixed::Image(asset) => {
                    store.insert_asset(&asset)?;
                    report.assets += 1;
                    Ok(())
                }
            });
            if let Err(e) = result {
                report.fail(&file.abs_path, &e);
            }
        }
    }

    fn load_assets(&self, store: &ContentStore, report: &mut LoadReport) {
        let mut site_base = Metadata::new();

        if let Some(assets_dir) = &self.config.assets_dir {
            for file in scan_assets(assets_dir) {
                if file.is_site_source() {
                    match read_site_source(&file) {
                        Ok(meta) => site_base = meta,
                        Err(e) => report.fail(&file.abs_path, &e),
                    }
                    continue;
                }

                let result = self.asset_for(&file).and_then(|asset| {
                    store.insert_asset(&asset)?;
                    Ok(())
                });
                match result {
                    Ok(()) => report.assets += 1,
                    Err(e) => report.fail(&file.abs_path, &e),
                }
            }
        }

        let result = site_asset(&site_base, &self.config.site).and_then(|asset| {
            store.insert_asset(&asset)?;
            Ok(())
        });
        match result {
            Ok(()) => report.assets += 1,
            Err(e) => report.fail(Path::new(SITE_META_PATH), &e),
        }
    }

    fn asset_for(&self, file: &AssetFile) -> Result<Asset, FileError> {
        if file.kind == AssetKind::Image {
            return copy_image(&file.abs_path, &file.rel_path, &self.config.output_dir);
        }
        let content = std::fs::read(&file.abs_path)?;
        Ok(Asset::new(file.rel_path.clone(), file.kind, content))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bake_store::{DriverKind, PAGE_COLUMNS, Page, SqlValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct Fixture {
        _temp: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let root = temp.path().to_path_buf();
            Self { _temp: temp, root }
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn config(&self) -> LoaderConfig {
            LoaderConfig::new(self.root.join("pages"), self.root.join("out"))
                .with_assets_dir(self.root.join("assets"))
        }
    }

    fn store() -> ContentStore {
        ContentStore::in_memory(DriverKind::Accessor).unwrap()
    }

    fn page_row(store: &ContentStore, path: &str) -> Page {
        let row = store
            .fetch_one(
                &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE path = ?"),
                &[SqlValue::Text(path.to_owned())],
            )
            .unwrap()
            .unwrap();
        Page::from_row(&row).unwrap()
    }

    #[test]
    fn test_missing_content_dir() {
        let fx = Fixture::new();
        let err = Loader::new(fx.config()).load(&store()).unwrap_err();
        assert!(matches!(err, LoadError::ContentDirNotFound(_)));
    }

    #[test]
    fn test_blog_post_scenario() {
        let fx = Fixture::new();
        fx.write("pages/blog/meta.yaml", "template: blog\n");
        fx.write(
            "pages/blog/post.md",
            "---\ntitle: \"Hi\"\ndate: \"2024-01-01\"\n---\n# Hi\n",
        );
        fx.write("assets/templates/blog.html", "<main>{{ page.content }}</main>");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();
        assert_eq!(report.pages, 1);
        assert!(report.failures.is_empty());

        let page = page_row(&store, "blog/post");
        assert_eq!(page.slug, "blog/post");
        assert_eq!(page.template, "blog");
        assert_eq!(page.published_date.as_deref(), Some("2024-01-01"));
        assert_eq!(page.content, "<h1>Hi</h1>\n");
        assert_eq!(page.meta("title"), Some(&json!("Hi")));

        let template = store.asset("blog.html", AssetKind::Template).unwrap().unwrap();
        assert_eq!(template.text(), "<main>{{ page.content }}</main>");
    }

    #[test]
    fn test_drafts_skipped_unless_requested() {
        let fx = Fixture::new();
        fx.write("pages/a.md", "---\ndraft: true\n---\nA");
        fx.write("pages/b.md", "B");

        let skipped = store();
        let report = Loader::new(fx.config()).load(&skipped).unwrap();
        assert_eq!((report.pages, report.drafts_skipped), (1, 1));
        assert_eq!(skipped.count_pages().unwrap(), 1);

        let included = store();
        let report = Loader::new(fx.config().with_drafts(true))
            .load(&included)
            .unwrap();
        assert_eq!((report.pages, report.drafts_skipped), (2, 0));
    }

    #[test]
    fn test_bad_file_does_not_abort_load() {
        let fx = Fixture::new();
        fx.write("pages/bad.md", "---\ntitle: [broken\n---\n");
        fx.write("pages/good.md", "# Good");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("bad.md"));
        assert!(report.failures[0].message.starts_with("Invalid front matter"));
        assert_eq!(page_row(&store, "good").title, "Good");
    }

    #[test]
    fn test_unservable_page_path_is_a_failure() {
        let fx = Fixture::new();
        fx.write("pages/v1..2.md", "# Old");
        fx.write("pages/it's.md", "# Quote");
        fx.write("pages/fine.md", "# Fine");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.failures.len(), 2);
        for failure in &report.failures {
            assert_eq!(failure.message, "invalid page path");
        }
        assert_eq!(store.count_pages().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_page_path_is_a_failure() {
        let fx = Fixture::new();
        fx.write("pages/about.html", "html");
        fx.write("pages/about.md", "md");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(page_row(&store, "about").content, "html");
    }

    #[test]
    fn test_images_copied_from_both_trees() {
        let fx = Fixture::new();
        fx.write("pages/index.md", "home");
        fx.write("pages/images/cat.png", "PNG");
        fx.write("assets/images/logo.svg", "<svg/>");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();
        assert!(report.failures.is_empty());

        let cat = store.asset("cat.png", AssetKind::Image).unwrap().unwrap();
        assert_eq!(cat.text(), "/images/cat.png");
        let logo = store.asset("logo.svg", AssetKind::Image).unwrap().unwrap();
        assert_eq!(logo.text(), "/images/logo.svg");
        assert!(fx.root.join("out/images/cat.png").is_file());
        assert!(fx.root.join("out/images/logo.svg").is_file());
    }

    #[test]
    fn test_site_metadata_merged_with_config() {
        let fx = Fixture::new();
        fx.write("pages/index.md", "home");
        fx.write("assets/data/site.yaml", "title: File\nurl: https://x\n");
        fx.write("assets/data/authors.json", "[]");

        let site = json!({"title": "Config"}).as_object().cloned().unwrap();
        let store = store();
        let report = Loader::new(fx.config().with_site(site)).load(&store).unwrap();
        assert_eq!(report.assets, 2);

        let asset = store.asset(SITE_META_PATH, AssetKind::Data).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&asset.content).unwrap();
        assert_eq!(value, json!({"title": "Config", "url": "https://x"}));
        assert!(store.asset("authors.json", AssetKind::Data).unwrap().is_some());
    }

    #[test]
    fn test_nested_asset_kind_from_parent_directory() {
        let fx = Fixture::new();
        fx.write("pages/index.md", "home");
        fx.write("assets/templates/partials/nav.html", "<nav></nav>");
        fx.write("assets/theme/css/dark.css", "body {}");

        let store = store();
        let report = Loader::new(fx.config()).load(&store).unwrap();
        assert!(report.failures.is_empty());

        assert!(store.asset("dark.css", AssetKind::Stylesheet).unwrap().is_some());
        assert!(
            store
                .asset("templates/partials/nav.html", AssetKind::Other)
                .unwrap()
                .is_some()
        );
        assert!(store.asset("partials/nav.html", AssetKind::Template).unwrap().is_none());
    }

    #[test]
    fn test_site_metadata_without_assets_dir() {
        let fx = Fixture::new();
        fx.write("pages/index.md", "home");

        let config = LoaderConfig::new(fx.root.join("pages"), fx.root.join("out"));
        let store = store();
        Loader::new(config).load(&store).unwrap();

        let asset = store.asset(SITE_META_PATH, AssetKind::Data).unwrap().unwrap();
        assert_eq!(asset.text(), "{}");
    }
}
