//! Source discovery by filesystem walking.
//!
//! The scanner separates discovery from processing. It walks the content
//! tree, resolves inherited directory metadata and the mixer of each
//! directory, and returns one [`SourceFile`] per regular file. Nothing but
//! metadata files is read at this stage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::metadata::{Metadata, merge_metadata, parse_metadata};
use crate::mixer::MixerKind;

/// A content file with everything needed to process it.
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    /// Path relative to the content root, `/`-separated (e.g., "blog/post.md").
    pub rel_path: String,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the directory that selected the mixer.
    pub section_rel: String,
    /// Mixer processing this file.
    pub mixer: MixerKind,
    /// Metadata inherited from ancestor directories.
    pub meta: Arc<Metadata>,
}

/// Walks a content tree.
pub(crate) struct Scanner<'a> {
    root: &'a Path,
    meta_filename: &'a str,
}

/// Per-directory walk state.
struct DirContext<'a> {
    rel: &'a str,
    section_rel: &'a str,
    mixer: MixerKind,
    meta: Arc<Metadata>,
}

impl<'a> Scanner<'a> {
    pub fn new(root: &'a Path, meta_filename: &'a str) -> Self {
        Self {
            root,
            meta_filename,
        }
    }

    /// Scan the tree in sorted order.
    ///
    /// Returns an empty Vec if the root does not exist.
    pub fn scan(&self) -> Vec<SourceFile> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            let ctx = DirContext {
                rel: "",
                section_rel: "",
                mixer: MixerKind::Pages,
                meta: Arc::new(Metadata::new()),
            };
            self.scan_directory(self.root, &ctx, &mut files);
        }
        files
    }

    fn scan_directory(&self, dir: &Path, ctx: &DirContext<'_>, files: &mut Vec<SourceFile>) {
        let entries = match sorted_entries(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory");
                return;
            }
        };

        let meta = match entries
            .iter()
            .find(|(name, is_dir)| !is_dir && name == self.meta_filename)
        {
            Some((name, _)) => {
                let own = read_dir_metadata(&dir.join(name));
                Arc::new(merge_metadata(&ctx.meta, &own))
            }
            None => Arc::clone(&ctx.meta),
        };

        for (name, is_dir) in &entries {
            if *is_dir {
                let child_rel = join(ctx.rel, name);
                let (mixer, section_rel) = match MixerKind::for_dir(name) {
                    Some(mixer) => (mixer, String::new()),
                    None => (ctx.mixer, join(ctx.section_rel, name)),
                };
                let child = DirContext {
                    rel: &child_rel,
                    section_rel: &section_rel,
                    mixer,
                    meta: Arc::clone(&meta),
                };
                self.scan_directory(&dir.join(name), &child, files);
            } else if name != self.meta_filename {
                files.push(SourceFile {
                    rel_path: join(ctx.rel, name),
                    abs_path: dir.join(name),
                    section_rel: join(ctx.section_rel, name),
                    mixer: ctx.mixer,
                    meta: Arc::clone(&meta),
                });
            }
        }
    }
}

/// Visible entries of a directory as `(name, is_dir)`, sorted by name.
///
/// Hidden (`.`-prefixed) entries and names that are not valid UTF-8 are
/// skipped.
pub(crate) fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut entries: Vec<(String, bool)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            if name.starts_with('.') {
                return None;
            }
            let is_dir = e.file_type().is_ok_and(|t| t.is_dir());
            Some((name, is_dir))
        })
        .collect();
    entries.sort();
    Ok(entries)
}

/// Read a directory metadata file, degrading to empty metadata on error.
fn read_dir_metadata(path: &Path) -> Metadata {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read metadata file");
            return Metadata::new();
        }
    };
    parse_metadata(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Malformed metadata file, ignoring");
        Metadata::new()
    })
}

pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
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

    fn scan(root: &Path) -> Vec<SourceFile> {
        Scanner::new(root, "meta.yaml").scan()
    }

    #[test]
    fn test_scan_missing_root() {
        let temp = tempfile::tempdir().unwrap();
        assert!(scan(&temp.path().join("missing")).is_empty());
    }

    #[test]
    fn test_scan_sorted_and_skips_hidden() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "b.md", "");
        write(temp.path(), "a.md", "");
        write(temp.path(), ".hidden.md", "");
        write(temp.path(), ".git/config", "");
        write(temp.path(), "sub/c.md", "");

        let paths: Vec<_> = scan(temp.path()).into_iter().map(|f| f.rel_path).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "sub/c.md"]);
    }

    #[test]
    fn test_metadata_inheritance_chain() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "meta.yaml", "template: page\nauthor: ann\n");
        write(temp.path(), "blog/meta.yaml", "template: blog\n");
        write(temp.path(), "blog/2024/meta.yaml", "category: news\n");
        write(temp.path(), "blog/2024/post.md", "");
        write(temp.path(), "about.md", "");

        let files = scan(temp.path());
        let about = files.iter().find(|f| f.rel_path == "about.md").unwrap();
        let post = files
            .iter()
            .find(|f| f.rel_path == "blog/2024/post.md")
            .unwrap();

        assert_eq!(
            serde_json::Value::Object((*about.meta).clone()),
            json!({"template": "page", "author": "ann"})
        );
        assert_eq!(
            serde_json::Value::Object((*post.meta).clone()),
            json!({"template": "blog", "author": "ann", "category": "news"})
        );
    }

    #[test]
    fn test_metadata_file_is_not_a_source() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "meta.yaml", "a: 1\n");
        assert!(scan(temp.path()).is_empty());
    }

    #[test]
    fn test_malformed_metadata_degrades_to_parent() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "meta.yaml", "author: ann\n");
        write(temp.path(), "docs/meta.yaml", "title: [broken");
        write(temp.path(), "docs/a.md", "");

        let files = scan(temp.path());
        assert_eq!(files[0].meta.get("author"), Some(&json!("ann")));
        assert!(files[0].meta.get("title").is_none());
    }

    #[test]
    fn test_mixer_selected_by_dir_name_and_inherited() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "index.md", "");
        write(temp.path(), "blog/images/2024/cat.png", "");
        write(temp.path(), "raw/feed.xml", "");
        write(temp.path(), "raw/nested/x.txt", "");

        let files = scan(temp.path());
        let by_path = |p: &str| files.iter().find(|f| f.rel_path == p).unwrap();

        assert_eq!(by_path("index.md").mixer, MixerKind::Pages);

        let cat = by_path("blog/images/2024/cat.png");
        assert_eq!(cat.mixer, MixerKind::Images);
        assert_eq!(cat.section_rel, "2024/cat.png");

        assert_eq!(by_path("raw/feed.xml").mixer, MixerKind::Passthrough);
        assert_eq!(by_path("raw/nested/x.txt").mixer, MixerKind::Passthrough);
        assert_eq!(by_path("raw/nested/x.txt").section_rel, "nested/x.txt");
    }

    #[test]
    fn test_custom_meta_filename() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "_dir.yml", "template: doc\n");
        write(temp.path(), "a.md", "");

        let files = Scanner::new(temp.path(), "_dir.yml").scan();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].meta.get("template"), Some(&json!("doc")));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
    }
}
