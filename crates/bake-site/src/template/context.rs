//! Restricted render context.
//!
//! Templates see `page`, `baker` and `site`. `page` and `baker` are views
//! exposing a fixed subset of the underlying data; raw queries are not
//! reachable and every path argument goes back through Baker validation.

use std::sync::Arc;

use bake_store::{AssetKind, Page};
use minijinja::value::{Enumerator, Object, Value, from_args};
use minijinja::{Error, ErrorKind, State, context};

use crate::validate::sanitize_path;
use crate::{AssetValue, Baker, DEFAULT_PAGE_LIMIT};

const PAGE_KEYS: &[&str] = &[
    "title",
    "content",
    "data",
    "meta",
    "path",
    "slug",
    "template",
    "published_date",
    "date",
];

/// Build the `(page, baker, site)` context for one render.
pub(crate) fn page_context(baker: &Baker, page: &Page) -> Value {
    context! {
        page => PageView::value(baker, page.clone()),
        baker => Value::from_object(BakerView { baker: baker.clone() }),
        site => Value::from_serialize(baker.site()),
    }
}

/// Read-only page view.
#[derive(Debug)]
struct PageView {
    page: Page,
    baker: Baker,
}

impl PageView {
    fn value(baker: &Baker, page: Page) -> Value {
        Value::from_object(Self {
            page,
            baker: baker.clone(),
        })
    }

    fn optional(baker: &Baker, page: Option<Page>) -> Value {
        page.map_or_else(|| Value::from(()), |page| Self::value(baker, page))
    }

    fn list(baker: &Baker, pages: Vec<Page>) -> Value {
        pages
            .into_iter()
            .map(|page| Self::value(baker, page))
            .collect()
    }
}

impl Object for PageView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let page = &self.page;
        let value = match key.as_str()? {
            "title" => Value::from(page.title.as_str()),
            "content" => Value::from_safe_string(page.content.clone()),
            "data" | "meta" => Value::from_serialize(&page.data),
            "path" => Value::from(sanitize_path(&page.path)),
            "slug" => Value::from(page.slug.as_str()),
            "template" => Value::from(page.template.as_str()),
            "published_date" | "date" => page
                .published_date
                .as_deref()
                .map_or_else(|| Value::from(()), Value::from),
            _ => return None,
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(PAGE_KEYS)
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let () = from_args(args)?;
        match method {
            "prev" => Ok(PageView::optional(
                &self.baker,
                self.baker.prev_page(&self.page),
            )),
            "next" => Ok(PageView::optional(
                &self.baker,
                self.baker.next_page(&self.page),
            )),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// Capability-restricted Baker view.
#[derive(Debug)]
struct BakerView {
    baker: Baker,
}

impl BakerView {
    fn asset(&self, args: &[Value]) -> Result<Value, Error> {
        let (name, kind): (&str, Option<&str>) = from_args(args)?;
        let kind = match kind {
            Some(tag) => tag
                .parse::<AssetKind>()
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e))?,
            None => AssetKind::Data,
        };

        let value = self
            .baker
            .get_asset(name, kind)
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        match value {
            None => Ok(Value::from(())),
            Some(AssetValue::Raw(bytes)) => {
                Ok(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Some(AssetValue::Data(data)) => Ok(Value::from_serialize(&data)),
            Some(AssetValue::Template(template)) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("template {} cannot be used as a value", template.name()),
            )),
        }
    }

    fn page(&self, args: &[Value]) -> Result<Value, Error> {
        let (path,): (&str,) = from_args(args)?;
        Ok(PageView::optional(&self.baker, self.baker.get_page(path)))
    }

    fn latest_pages(&self, args: &[Value]) -> Result<Value, Error> {
        let (limit, offset, category): (Option<usize>, Option<usize>, Option<&str>) =
            from_args(args)?;
        let pages = self.baker.latest_pages(
            limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            offset.unwrap_or(0),
            category,
        );
        Ok(PageView::list(&self.baker, pages))
    }

    fn search(&self, args: &[Value]) -> Result<Value, Error> {
        let (query, limit, offset): (&str, Option<usize>, Option<usize>) = from_args(args)?;
        let pages = self.baker.search(
            query,
            limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            offset.unwrap_or(0),
        );
        Ok(PageView::list(&self.baker, pages))
    }
}

impl Object for BakerView {
    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "asset" => self.asset(args),
            "page" => self.page(args),
            "latest_pages" => self.latest_pages(args),
            "search" => self.search(args),
            "query" => Err(Error::new(
                ErrorKind::InvalidOperation,
                "raw queries are not available in templates",
            )),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}
