//! Asset tree discovery and site metadata.
//!
//! The asset kind of a file is the name of its immediate parent directory.
//! Under a kind directory the asset path is the file name
//! (`css/site.css` is a stylesheet at `site.css`). Files under any other
//! directory, or at the asset root, are `other` assets keyed by their path
//! from the asset root (`templates/partials/nav.html` is `other` at
//! `templates/partials/nav.html`).

use std::fs;
use std::path::{Path, PathBuf};

use bake_store::{Asset, AssetKind, SITE_META_PATH};

use crate::error::FileError;
use crate::metadata::{Metadata, merge_metadata, parse_metadata};
use crate::scanner::{join, sorted_entries};

/// Names of the site metadata source inside the data directory.
const SITE_SOURCES: [&str; 3] = ["site.json", "site.yaml", "site.yml"];

/// A file of the asset tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssetFile {
    pub kind: AssetKind,
    /// Asset path within its kind.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

impl AssetFile {
    /// Whether this file is the site metadata source.
    pub fn is_site_source(&self) -> bool {
        self.kind == AssetKind::Data && SITE_SOURCES.contains(&self.rel_path.as_str())
    }
}

/// Walk the asset tree in sorted order.
///
/// Unreadable directories are logged and skipped.
pub(crate) fn scan_assets(root: &Path) -> Vec<AssetFile> {
    let mut files = Vec::new();
    collect(root, None, "", &mut files);
    files
}

fn collect(dir: &Path, parent: Option<&str>, prefix: &str, files: &mut Vec<AssetFile>) {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to read asset directory");
            return;
        }
    };
    for (name, is_dir) in entries {
        let rel = join(prefix, &name);
        if is_dir {
            collect(&dir.join(&name), Some(name.as_str()), &rel, files);
            continue;
        }
        let (kind, rel_path) = match parent.and_then(AssetKind::from_tag) {
            Some(kind) => (kind, name.clone()),
            None => (AssetKind::Other, rel),
        };
        files.push(AssetFile {
            kind,
            rel_path,
            abs_path: dir.join(&name),
        });
    }
}

/// Parse the site metadata source file.
pub(crate) fn read_site_source(file: &AssetFile) -> Result<Metadata, FileError> {
    let content = fs::read_to_string(&file.abs_path)?;
    Ok(parse_metadata(&content)?)
}

/// Build the site metadata asset; `overrides` win over `base`.
pub(crate) fn site_asset(base: &Metadata, overrides: &Metadata) -> Result<Asset, FileError> {
    let merged = merge_metadata(base, overrides);
    let content = serde_json::to_vec(&merged).map_err(bake_store::StoreError::serialization)?;
    Ok(Asset::new(SITE_META_PATH, AssetKind::Data, content))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_assets_kinds_and_paths() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "templates/page.html", "");
        write(temp.path(), "css/site.css", "");
        write(temp.path(), "fonts/a.woff", "");
        write(temp.path(), "favicon.ico", "");
        write(temp.path(), "css/.cache", "");

        let found: Vec<_> = scan_assets(temp.path())
            .into_iter()
            .map(|f| (f.kind, f.rel_path))
            .collect();
        assert_eq!(
            found,
            vec![
                (AssetKind::Stylesheet, "site.css".to_owned()),
                (AssetKind::Other, "favicon.ico".to_owned()),
                (AssetKind::Other, "fonts/a.woff".to_owned()),
                (AssetKind::Template, "page.html".to_owned()),
            ]
        );
    }

    #[test]
    fn test_nested_assets_take_parent_directory_kind() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "templates/partials/nav.html", "");
        write(temp.path(), "theme/css/dark.css", "");
        write(temp.path(), "blog/images/cat.png", "");
        write(temp.path(), "js/vendor/lib.js", "");

        let found: Vec<_> = scan_assets(temp.path())
            .into_iter()
            .map(|f| (f.kind, f.rel_path))
            .collect();
        assert_eq!(
            found,
            vec![
                (AssetKind::Image, "cat.png".to_owned()),
                (AssetKind::Other, "js/vendor/lib.js".to_owned()),
                (AssetKind::Other, "templates/partials/nav.html".to_owned()),
                (AssetKind::Stylesheet, "dark.css".to_owned()),
            ]
        );
    }

    #[test]
    fn test_scan_assets_missing_root() {
        let temp = tempfile::tempdir().unwrap();
        assert!(scan_assets(&temp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_site_source_detection() {
        let file = |kind, rel: &str| AssetFile {
            kind,
            rel_path: rel.to_owned(),
            abs_path: PathBuf::new(),
        };
        assert!(file(AssetKind::Data, "site.yaml").is_site_source());
        assert!(!file(AssetKind::Data, "authors.yaml").is_site_source());
        assert!(!file(AssetKind::Other, "site.json").is_site_source());
    }

    #[test]
    fn test_site_asset_config_wins() {
        let base = json!({"title": "From file", "url": "https://a"});
        let overrides = json!({"title": "From config"});

        let asset = site_asset(
            base.as_object().unwrap(),
            overrides.as_object().unwrap(),
        )
        .unwrap();

        assert_eq!(asset.path, SITE_META_PATH);
        assert_eq!(asset.kind, AssetKind::Data);
        let value: serde_json::Value = serde_json::from_slice(&asset.content).unwrap();
        assert_eq!(value, json!({"title": "From config", "url": "https://a"}));
    }

    #[test]
    fn test_read_site_source_json_and_yaml() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "data/site.json", r#"{"title": "J"}"#);
        write(temp.path(), "data/site.yml", "title: Y\n");

        let files = scan_assets(temp.path());
        let titles: Vec<_> = files
            .iter()
            .map(|f| read_site_source(f).unwrap().get("title").cloned().unwrap())
            .collect();
        assert_eq!(titles, vec![json!("J"), json!("Y")]);
    }
}
