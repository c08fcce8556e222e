//! Template filters.
//!
//! Filters live in an explicit [`FilterTable`] handed to the [`Baker`]
//! through its config. Each filter is a plain function of its input, its
//! arguments and Baker-backed asset lookups.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use bake_store::AssetKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};

use super::Markup;
use crate::Baker;
use crate::error_page::escape;

/// Signature of a template filter.
///
/// Receives the Baker, the filtered value and the positional arguments
/// (keyword arguments arrive as a trailing map).
pub type FilterFn = fn(&Baker, &Value, &[Value]) -> Result<Value, Error>;

/// Default format of the `date` filter.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Named filters available inside templates.
#[derive(Clone)]
pub struct FilterTable {
    filters: BTreeMap<String, FilterFn>,
}

impl FilterTable {
    /// Table without any filters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            filters: BTreeMap::new(),
        }
    }

    /// Table with the built-in filters: `date`, `inline`, `inline_css`,
    /// `image` and `asset_url`.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with("date", date)
            .with("inline", inline)
            .with("inline_css", inline_css)
            .with("image", image)
            .with("asset_url", asset_url)
    }

    /// Add or replace a filter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, filter: FilterFn) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    /// Filter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Look up a filter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).copied()
    }

    pub(crate) fn register(&self, env: &mut Environment<'static>, baker: &Baker) {
        for (name, filter) in &self.filters {
            let filter = *filter;
            let baker = baker.clone();
            env.add_filter(name.clone(), move |value: Value, args: Rest<Value>| {
                filter(&baker, &value, &args.0)
            });
        }
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Argument by position, or by name from a trailing keyword map.
fn arg(args: &[Value], index: usize, name: &str) -> Option<Value> {
    let positional = match args.last() {
        Some(last) if last.kind() == ValueKind::Map => {
            if let Ok(value) = last.get_attr(name)
                && !value.is_undefined()
            {
                return Some(value);
            }
            &args[..args.len() - 1]
        }
        _ => args,
    };
    positional
        .get(index)
        .filter(|v| !v.is_undefined() && !v.is_none())
        .cloned()
}

fn str_arg(args: &[Value], index: usize, name: &str) -> Result<Option<String>, Error> {
    match arg(args, index, name) {
        None => Ok(None),
        Some(value) => value.as_str().map(|s| Some(s.to_owned())).ok_or_else(|| {
            invalid(format!("argument {name:?} must be a string, got {}", value.kind()))
        }),
    }
}

fn kind_arg(args: &[Value], index: usize, default: AssetKind) -> Result<AssetKind, Error> {
    match str_arg(args, index, "kind")? {
        None => Ok(default),
        Some(tag) => tag
            .parse()
            .map_err(|e: String| Error::new(ErrorKind::InvalidOperation, e)),
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn input_name(value: &Value, filter: &str) -> Result<String, Error> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(format!("{filter} expects an asset name, got {}", value.kind())))
}

fn lookup(baker: &Baker, name: &str, kind: AssetKind) -> Result<bake_store::Asset, Error> {
    baker
        .get_raw_asset(name, kind)
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| invalid(format!("asset not found: {kind}/{name}")))
}

/// Format an ISO date string (`date(fmt="%Y-%m-%d")`).
///
/// Missing values format as an empty string; unparseable values pass
/// through unchanged.
fn date(_baker: &Baker, value: &Value, args: &[Value]) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(Value::from(""));
    }
    let fmt = str_arg(args, 0, "fmt")?.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_owned());
    let Some(parsed) = value.as_str().and_then(parse_date) else {
        return Ok(value.clone());
    };

    let mut out = String::new();
    write!(out, "{}", parsed.format(&fmt))
        .map_err(|_| invalid(format!("invalid date format {fmt:?}")))?;
    Ok(Value::from(out))
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

/// Inline an asset's content (`inline(kind="js")`).
fn inline(baker: &Baker, value: &Value, args: &[Value]) -> Result<Value, Error> {
    let name = input_name(value, "inline")?;
    let kind = kind_arg(args, 0, AssetKind::Script)?;
    let asset = lookup(baker, &name, kind)?;
    let text = asset.text();
    let content = match kind {
        AssetKind::Script => escape_closing_tag(&text, "script"),
        AssetKind::Stylesheet => escape_closing_tag(&text, "style"),
        _ => text.into_owned(),
    };
    Ok(Markup::new(content).into())
}

/// Inline a stylesheet wrapped in a `<style>` element.
fn inline_css(baker: &Baker, value: &Value, _args: &[Value]) -> Result<Value, Error> {
    let name = input_name(value, "inline_css")?;
    let asset = lookup(baker, &name, AssetKind::Stylesheet)?;
    let css = escape_closing_tag(&asset.text(), "style");
    Ok(Markup::new(format!("<style>\n{css}\n</style>")).into())
}

/// Image tag for an image asset (`image(alt="")`).
fn image(baker: &Baker, value: &Value, args: &[Value]) -> Result<Value, Error> {
    let name = input_name(value, "image")?;
    let alt = str_arg(args, 0, "alt")?.unwrap_or_default();
    let asset = lookup(baker, &name, AssetKind::Image)?;
    Ok(Markup::new(format!(
        "<img src=\"{}\" alt=\"{}\">",
        escape(asset.text().trim()),
        escape(&alt)
    ))
    .into())
}

/// Public URL of an asset (`asset_url(kind="images")`).
///
/// Image assets resolve to their stored reference; other kinds to
/// `/<kind>/<path>`. The result is attribute-safe markup.
fn asset_url(baker: &Baker, value: &Value, args: &[Value]) -> Result<Value, Error> {
    let name = input_name(value, "asset_url")?;
    let kind = kind_arg(args, 0, AssetKind::Image)?;
    let asset = lookup(baker, &name, kind)?;
    let url = if kind == AssetKind::Image {
        asset.text().trim().to_owned()
    } else {
        format!("/{}/{}", kind.tag(), asset.path)
    };
    Ok(Markup::new(escape(&url)).into())
}

/// Neutralize `</tag` sequences (case-insensitive) so inlined text cannot
/// close its surrounding element.
pub(crate) fn escape_closing_tag(text: &str, tag: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("</") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let closes_tag = after
            .as_bytes()
            .get(..tag.len())
            .is_some_and(|b| b.eq_ignore_ascii_case(tag.as_bytes()));
        out.push_str(if closes_tag { "<\\/" } else { "</" });
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_closing_tag() {
        assert_eq!(
            escape_closing_tag("a</script>b</SCRIPT >c</div>", "script"),
            "a<\\/script>b<\\/SCRIPT >c</div>"
        );
        assert_eq!(escape_closing_tag("x</sty", "style"), "x</sty");
        assert_eq!(escape_closing_tag("no tags", "style"), "no tags");
    }

    #[test]
    fn test_parse_date_forms() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(parse_date("2024-01-02").unwrap().date(), day);
        assert_eq!(parse_date("2024-01-02T10:30:00").unwrap().date(), day);
        assert_eq!(parse_date("2024-01-02T10:30:00+02:00").unwrap().date(), day);
        assert_eq!(parse_date("2024-01-02 extra").unwrap().date(), day);
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_standard_table_names() {
        let names: Vec<_> = FilterTable::standard().names().map(str::to_owned).collect();
        assert_eq!(names, vec!["asset_url", "date", "image", "inline", "inline_css"]);
    }

    #[test]
    fn test_with_replaces_filter() {
        fn shout(_: &Baker, value: &Value, _: &[Value]) -> Result<Value, Error> {
            Ok(Value::from(value.to_string().to_uppercase()))
        }
        let table = FilterTable::empty().with("date", shout);
        assert_eq!(table.names().count(), 1);
        assert!(table.get("date").is_some());
        assert!(table.get("inline").is_none());
    }

    #[test]
    fn test_arg_positional_and_keyword() {
        let kwargs = Value::from_iter([("alt", Value::from("cat"))]);
        assert_eq!(arg(&[kwargs], 0, "alt"), Some(Value::from("cat")));
        assert_eq!(arg(&[Value::from("dog")], 0, "alt"), Some(Value::from("dog")));
        assert_eq!(arg(&[], 0, "alt"), None);
    }
}
