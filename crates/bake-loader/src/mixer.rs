//! Per-directory processors ("mixers").
//!
//! A mixer maps one source file plus its inherited metadata to a store row.
//! The mixer of a directory is chosen by the directory's name; directories
//! with other names inherit their parent's mixer.

use std::fs;
use std::path::Path;

use bake_store::{Asset, AssetKind, Page, slugify};
use serde_json::Value;

use crate::error::FileError;
use crate::front_matter::split_front_matter;
use crate::markdown::render_markdown;
use crate::metadata::{Metadata, merge_metadata, parse_metadata};
use crate::scanner::SourceFile;

/// Template used when metadata names none.
pub const DEFAULT_TEMPLATE: &str = "page";

/// Directory types of the content tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixerKind {
    /// Copy into the output image tree and store a reference asset.
    Images,
    /// Parse front matter and convert the body into a page.
    Pages,
    /// Store the body unchanged as a page.
    Passthrough,
}

impl MixerKind {
    /// Mixer selected by a directory name, if the name is in the table.
    #[must_use]
    pub fn for_dir(name: &str) -> Option<Self> {
        match name {
            "images" | "img" => Some(MixerKind::Images),
            "pages" | "posts" => Some(MixerKind::Pages),
            "static" | "raw" => Some(MixerKind::Passthrough),
            _ => None,
        }
    }
}

/// Output of a mixer.
#[derive(Debug)]
pub(crate) enum Mixed {
    Page(Page),
    Image(Asset),
}

/// Process one content file with its directory's mixer.
pub(crate) fn mix(file: &SourceFile, output_dir: &Path) -> Result<Mixed, FileError> {
    match file.mixer {
        MixerKind::Images => {
            copy_image(&file.abs_path, &file.section_rel, output_dir).map(Mixed::Image)
        }
        MixerKind::Pages => {
            let source = read_text(&file.abs_path)?;
            let (front, body) = split_front_matter(&source);
            let own = match front {
                Some(front) => parse_metadata(front)?,
                None => Metadata::new(),
            };
            let meta = merge_metadata(&file.meta, &own);

            let (content, h1) = if is_markdown(&file.rel_path) {
                let rendered = render_markdown(body);
                (rendered.html, rendered.title)
            } else {
                (body.to_owned(), None)
            };
            Ok(Mixed::Page(build_page(&file.rel_path, content, meta, h1)))
        }
        MixerKind::Passthrough => {
            let content = read_text(&file.abs_path)?;
            Ok(Mixed::Page(build_page(
                &file.rel_path,
                content,
                (*file.meta).clone(),
                None,
            )))
        }
    }
}

/// Copy an image into `<output>/images/<rel>` and build its reference asset.
pub(crate) fn copy_image(src: &Path, rel: &str, output_dir: &Path) -> Result<Asset, FileError> {
    let dest = output_dir.join("images").join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, &dest)?;
    tracing::debug!(src = %src.display(), dest = %dest.display(), "Copied image");
    Ok(Asset::new(rel, AssetKind::Image, format!("/images/{rel}")))
}

fn read_text(path: &Path) -> Result<String, FileError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| FileError::NotUtf8)
}

fn is_markdown(rel_path: &str) -> bool {
    Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// Strip the extension from the last path segment.
pub(crate) fn strip_extension(rel_path: &str) -> &str {
    let name_start = rel_path.rfind('/').map_or(0, |i| i + 1);
    match rel_path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &rel_path[..name_start + dot],
        _ => rel_path,
    }
}

fn build_page(rel_path: &str, content: String, data: Metadata, h1: Option<String>) -> Page {
    let path = strip_extension(rel_path).to_owned();
    let stem = path.rsplit('/').next().unwrap_or(&path).to_owned();

    let title = meta_string(&data, "title").or(h1).unwrap_or(stem);
    let template =
        meta_string(&data, "template").unwrap_or_else(|| DEFAULT_TEMPLATE.to_owned());
    let published_date =
        meta_string(&data, "published_date").or_else(|| meta_string(&data, "date"));

    Page {
        slug: slugify(&path),
        path,
        title,
        content,
        template,
        data,
        published_date,
    }
}

fn meta_string(meta: &Metadata, key: &str) -> Option<String> {
    match meta.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_owned())
        }
        _ => None,
    }
}
