//! Asset rows.
//!
//! An asset is a named, typed static artifact. The `(path, type)` pair is the
//! composite key of the `assets` table.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Well-known path of the site metadata asset (kind [`AssetKind::Data`]).
pub const SITE_META_PATH: &str = "site.json";

/// Closed set of asset kinds.
///
/// The stored tag doubles as the conventional directory name in the asset
/// tree (`templates/page.html`, `css/site.css`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    /// Image reference (`images`).
    Image,
    /// Stylesheet (`css`).
    Stylesheet,
    /// Template source (`templates`).
    Template,
    /// Structured data, JSON or YAML (`data`).
    Data,
    /// Script (`js`).
    Script,
    /// Anything else (`other`).
    Other,
}

impl AssetKind {
    /// Every kind, in tag order.
    pub const ALL: [AssetKind; 6] = [
        AssetKind::Image,
        AssetKind::Stylesheet,
        AssetKind::Template,
        AssetKind::Data,
        AssetKind::Script,
        AssetKind::Other,
    ];

    /// Tag stored in the `type` column.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Stylesheet => "css",
            AssetKind::Template => "templates",
            AssetKind::Data => "data",
            AssetKind::Script => "js",
            AssetKind::Other => "other",
        }
    }

    /// Parse a tag or one of its directory-name aliases.
    ///
    /// Returns `None` for names that do not denote a known kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag.to_ascii_lowercase().as_str() {
            "images" | "image" | "img" => AssetKind::Image,
            "css" | "styles" | "stylesheet" | "stylesheets" => AssetKind::Stylesheet,
            "templates" | "template" | "layouts" => AssetKind::Template,
            "data" => AssetKind::Data,
            "js" | "script" | "scripts" => AssetKind::Script,
            "other" => AssetKind::Other,
            _ => return None,
        };
        Some(kind)
    }

    /// Kind for an asset-tree directory name; unknown names are [`AssetKind::Other`].
    #[must_use]
    pub fn from_dir_name(name: &str) -> Self {
        Self::from_tag(name).unwrap_or(AssetKind::Other)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown asset type: {s}"))
    }
}

/// A row of the `assets` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    /// Path within the kind (e.g., "nav.html").
    pub path: String,
    /// Asset kind.
    pub kind: AssetKind,
    /// Raw content.
    pub content: Vec<u8>,
}

impl Asset {
    /// Create an asset.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: AssetKind, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            kind,
            content: content.into(),
        }
    }

    /// Content decoded as UTF-8 (lossy).
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}
