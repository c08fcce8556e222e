//! Store-backed template engine.
//!
//! Templates are parsed by minijinja. Every `{% extends %}` and
//! `{% include %}` is resolved through [`Baker::get_raw_asset`], never the
//! filesystem, so the same template renders identically against any store.
//! A fresh environment is built per compile; nothing is cached across
//! renders.

mod context;
mod filters;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bake_store::{AssetKind, Page};
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior};

pub use filters::{DEFAULT_DATE_FORMAT, FilterFn, FilterTable};

use crate::{Baker, RenderError};

/// Pre-sanitized HTML that is emitted without escaping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markup(String);

impl Markup {
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Markup> for Value {
    fn from(markup: Markup) -> Self {
        Value::from_safe_string(markup.0)
    }
}

/// Name of the most recent template the loader could not find.
type MissingSlot = Arc<Mutex<Option<String>>>;

/// A parsed template ready to render pages.
pub struct CompiledTemplate {
    name: String,
    env: Environment<'static>,
    baker: Baker,
    missing: MissingSlot,
}

impl CompiledTemplate {
    /// Parse `source` as template `name`.
    ///
    /// Parents are loaded lazily at render time.
    pub(crate) fn compile(baker: &Baker, name: &str, source: String) -> Result<Self, RenderError> {
        let missing = MissingSlot::default();
        let mut env = environment(baker, &missing);
        env.add_template_owned(name.to_owned(), source)
            .map_err(RenderError::Template)?;

        Ok(Self {
            name: name.to_owned(),
            env,
            baker: baker.clone(),
            missing,
        })
    }

    /// Template name (normalized asset path).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template for `page` with `page`, `baker` and `site` in scope.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ParentNotFound`] if a template of the extends
    /// chain is missing, or [`RenderError::Template`] for syntax and
    /// evaluation errors.
    pub fn render(&self, page: &Page) -> Result<String, RenderError> {
        let template = self
            .env
            .get_template(&self.name)
            .map_err(|e| self.map_error(e))?;
        let ctx = context::page_context(&self.baker, page);
        template.render(ctx).map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: Error) -> RenderError {
        if err.kind() == ErrorKind::TemplateNotFound {
            let name = self
                .missing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(name) = name {
                return RenderError::ParentNotFound(name);
            }
        }
        RenderError::Template(err)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn environment(baker: &Baker, missing: &MissingSlot) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.set_undefined_behavior(UndefinedBehavior::Lenient);

    let loader_baker = baker.clone();
    let missing = Arc::clone(missing);
    env.set_loader(move |name| {
        match loader_baker.get_raw_asset(name, AssetKind::Template) {
            Ok(Some(asset)) => Ok(Some(asset.text().into_owned())),
            Ok(None) => {
                tracing::debug!(template = %name, "Template not found in store");
                *missing.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_owned());
                Ok(None)
            }
            Err(e) => Err(Error::new(ErrorKind::InvalidOperation, e.to_string())),
        }
    });

    baker.config().filters.register(&mut env, baker);
    env
}

#[cfg(test)]
mod tests {
    use bake_store::{Asset, ContentStore, DriverKind};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{BakerConfig, Host};

    fn baker_with(templates: &[(&str, &str)]) -> Baker {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        for (path, source) in templates {
            store
                .insert_asset(&Asset::new(*path, AssetKind::Template, *source))
                .unwrap();
        }
        Baker::new(store, BakerConfig::new(Host::Build))
    }

    fn page(title: &str, content: &str) -> Page {
        Page {
            path: "p".to_owned(),
            slug: "p".to_owned(),
            title: title.to_owned(),
            content: content.to_owned(),
            template: "child".to_owned(),
            ..Default::default()
        }
    }

    fn render(baker: &Baker, name: &str, page: &Page) -> Result<String, RenderError> {
        let asset = baker.get_raw_asset(name, AssetKind::Template).unwrap().unwrap();
        CompiledTemplate::compile(baker, &asset.path, asset.text().into_owned())?.render(page)
    }

    #[test]
    fn test_child_replaces_only_named_block() {
        let baker = baker_with(&[
            (
                "base.html",
                "<header>H</header>{% block main %}default{% endblock %}<footer>F</footer>",
            ),
            (
                "child.html",
                "{% extends \"base\" %}{% block main %}<b>{{ page.title }}</b>{% endblock %}",
            ),
        ]);

        let out = render(&baker, "child", &page("Hello", "")).unwrap();
        assert_eq!(out, "<header>H</header><b>Hello</b><footer>F</footer>");
    }

    #[test]
    fn test_multi_level_chain() {
        let baker = baker_with(&[
            ("root.html", "[{% block a %}ra{% endblock %}|{% block b %}rb{% endblock %}]"),
            ("mid.html", "{% extends \"root.html\" %}{% block a %}ma{% endblock %}"),
            ("leaf.html", "{% extends \"mid\" %}{% block b %}lb{% endblock %}"),
        ]);

        assert_eq!(render(&baker, "leaf", &page("", "")).unwrap(), "[ma|lb]");
    }

    #[test]
    fn test_parent_not_found() {
        let baker = baker_with(&[("child.html", "{% extends \"missing\" %}")]);

        let err = render(&baker, "child", &page("", "")).unwrap_err();
        assert!(
            matches!(&err, RenderError::ParentNotFound(name) if name == "missing"),
            "{err:?}"
        );
    }

    #[test]
    fn test_parent_traversal_is_a_template_error() {
        let baker = baker_with(&[("child.html", "{% extends \"../etc/passwd\" %}")]);

        let err = render(&baker, "child", &page("", "")).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)), "{err:?}");
    }

    #[test]
    fn test_output_escaped_but_content_is_not() {
        let baker = baker_with(&[("child.html", "{{ page.title }}|{{ page.content }}")]);

        let out = render(&baker, "child", &page("<i>t</i>", "<p>body</p>")).unwrap();
        assert_eq!(out, "&lt;i&gt;t&lt;/i&gt;|<p>body</p>");
    }

    #[test]
    fn test_syntax_error() {
        let baker = baker_with(&[("child.html", "{% if %}")]);
        let err = render(&baker, "child", &page("", "")).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn test_include_resolves_through_store() {
        let baker = baker_with(&[
            ("partials/nav.html", "<nav>{{ page.title }}</nav>"),
            ("child.html", "{% include \"partials/nav\" %}"),
        ]);
        assert_eq!(
            render(&baker, "child", &page("Home", "")).unwrap(),
            "<nav>Home</nav>"
        );
    }

    fn filter_baker(source: &str) -> Baker {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        for (path, kind, content) in [
            ("child.html", AssetKind::Template, source),
            ("app.js", AssetKind::Script, "let s = \"</script>\";"),
            ("site.css", AssetKind::Stylesheet, "a{}</STYLE>"),
            ("cat.png", AssetKind::Image, "/images/cat.png"),
        ] {
            store.insert_asset(&Asset::new(path, kind, content)).unwrap();
        }
        Baker::new(store, BakerConfig::new(Host::Build))
    }

    fn render_filters(source: &str, page: &Page) -> Result<String, RenderError> {
        render(&filter_baker(source), "child", page)
    }

    fn dated(date: &str) -> Page {
        Page {
            published_date: Some(date.to_owned()),
            ..page("Dated", "")
        }
    }

    #[test]
    fn test_date_filter() {
        let post = dated("2024-03-05T10:00:00");
        assert_eq!(
            render_filters("{{ page.date|date }}", &post).unwrap(),
            "2024-03-05"
        );
        assert_eq!(
            render_filters("{{ page.date|date(fmt=\"%B %Y\") }}", &post).unwrap(),
            "March 2024"
        );
        assert_eq!(
            render_filters("[{{ page.date|date }}]", &page("Undated", "")).unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_date_filter_bad_format() {
        let err =
            render_filters("{{ page.date|date(\"%Q\") }}", &dated("2024-03-05")).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)), "{err:?}");
    }

    #[test]
    fn test_inline_escapes_closing_script() {
        let out = render_filters(
            "<script>{{ \"app.js\"|inline }}</script>",
            &page("", ""),
        )
        .unwrap();
        assert_eq!(out, "<script>let s = \"<\\/script>\";</script>");
    }

    #[test]
    fn test_inline_css_wraps_and_escapes_closing_style() {
        let out = render_filters("{{ \"site.css\"|inline_css }}", &page("", "")).unwrap();
        assert_eq!(out, "<style>\na{}<\\/STYLE>\n</style>");
    }

    #[test]
    fn test_image_escapes_alt() {
        let out = render_filters(
            "{{ \"cat.png\"|image(alt=page.title) }}",
            &page("Tom & \"Jerry\"", ""),
        )
        .unwrap();
        assert_eq!(
            out,
            "<img src=\"/images/cat.png\" alt=\"Tom &amp; &quot;Jerry&quot;\">"
        );
    }

    #[test]
    fn test_asset_url() {
        let out = render_filters(
            "<link href=\"{{ \"site.css\"|asset_url(kind=\"css\") }}\">{{ \"/images/cat.png\"|asset_url }}",
            &page("", ""),
        )
        .unwrap();
        assert_eq!(out, "<link href=\"/css/site.css\">/images/cat.png");
    }

    #[test]
    fn test_filter_errors_are_template_errors() {
        for source in [
            "{{ \"nope.css\"|inline_css }}",
            "{{ \"../site.css\"|asset_url(kind=\"css\") }}",
            "{{ \"site.css\"|asset_url(kind=\"fonts\") }}",
            "{{ 42|inline }}",
        ] {
            let err = render_filters(source, &page("", "")).unwrap_err();
            assert!(matches!(err, RenderError::Template(_)), "{source}: {err:?}");
        }
        let err = render_filters("{{ \"nope.css\"|inline_css }}", &page("", "")).unwrap_err();
        assert!(err.to_string().contains("asset not found"), "{err}");
    }

    #[test]
    fn test_markup_is_not_escaped() {
        let value = Value::from(Markup::new("<b>x</b>"));
        assert!(value.is_safe());
        assert_eq!(Markup::new("a").into_string(), "a");
    }
}
