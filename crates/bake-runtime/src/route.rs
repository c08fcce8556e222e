//! Route resolution.

use std::fmt::Write;

use bake_site::Baker;
use bake_store::Page;

/// Normalize a route to a page path.
///
/// Drops query and fragment, the leading `/`, a trailing `/` and a trailing
/// `.html`. The root route normalizes to the empty string.
#[must_use]
pub fn normalize_route(route: &str) -> &str {
    let end = route.find(['?', '#']).unwrap_or(route.len());
    let path = route[..end].trim_start_matches('/');
    let path = path.strip_suffix('/').unwrap_or(path);
    path.strip_suffix(".html").unwrap_or(path)
}

/// Page paths tried for a normalized route, in order.
///
/// Exact page, implicit index page, then the suffixed variant.
#[must_use]
pub fn route_candidates(path: &str) -> Vec<String> {
    if path.is_empty() {
        return vec!["index".to_owned()];
    }
    vec![
        path.to_owned(),
        format!("{path}/index"),
        format!("{path}.html"),
    ]
}

/// Find the page for `route`.
#[must_use]
pub fn resolve_route(baker: &Baker, route: &str) -> Option<Page> {
    let path = normalize_route(route);
    route_candidates(path)
        .iter()
        .find_map(|candidate| baker.get_page(candidate))
}

/// Render the page for `route`, or a 404 body.
#[must_use]
pub fn render_route(baker: &Baker, route: &str) -> String {
    match resolve_route(baker, route) {
        Some(page) => baker.render_page(&page),
        None => {
            tracing::debug!(route, "No page for route");
            not_found_page(route)
        }
    }
}

/// Generated 404 body.
#[must_use]
pub fn not_found_page(route: &str) -> String {
    let mut html = String::with_capacity(256);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n<title>Not found</title>\n");
    html.push_str("</head>\n<body>\n<h1>404</h1>\n");
    let _ = writeln!(html, "<p>No page at <code>{}</code>.</p>", escape(route));
    html.push_str("<p><a href=\"/\">Home</a></p>\n</body>\n</html>\n");
    html
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use bake_site::{BakerConfig, Host};
    use bake_store::{Asset, AssetKind, ContentStore, DriverKind};

    use super::*;

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("/"), "");
        assert_eq!(normalize_route(""), "");
        assert_eq!(normalize_route("/blog/"), "blog");
        assert_eq!(normalize_route("/blog/post.html"), "blog/post");
        assert_eq!(normalize_route("/about?x=1#top"), "about");
        assert_eq!(normalize_route("/a/b/#frag"), "a/b");
    }

    #[test]
    fn test_candidates() {
        assert_eq!(route_candidates(""), vec!["index"]);
        assert_eq!(
            route_candidates("blog"),
            vec!["blog", "blog/index", "blog.html"]
        );
    }

    fn baker() -> Baker {
        let store = ContentStore::in_memory(DriverKind::Cursor).unwrap();
        store
            .insert_asset(&Asset::new(
                "page.html",
                AssetKind::Template,
                "<main>{{ page.title }}</main>",
            ))
            .unwrap();
        for path in ["index", "about", "blog/index", "blog/post"] {
            store
                .insert_page(&Page {
                    path: path.to_owned(),
                    slug: path.to_owned(),
                    title: format!("T {path}"),
                    template: "page".to_owned(),
                    ..Default::default()
                })
                .unwrap();
        }
        Baker::new(store, BakerConfig::new(Host::Browser))
    }

    #[test]
    fn test_resolve_exact_and_index() {
        let baker = baker();
        assert_eq!(resolve_route(&baker, "/").unwrap().path, "index");
        assert_eq!(resolve_route(&baker, "/about/").unwrap().path, "about");
        assert_eq!(resolve_route(&baker, "/blog").unwrap().path, "blog/index");
        assert_eq!(
            resolve_route(&baker, "/blog/post.html").unwrap().path,
            "blog/post"
        );
        assert!(resolve_route(&baker, "/missing").is_none());
        assert!(resolve_route(&baker, "/../etc/passwd").is_none());
    }

    #[test]
    fn test_render_route() {
        let baker = baker();
        assert_eq!(render_route(&baker, "/about"), "<main>T about</main>");

        let html = render_route(&baker, "/nope<script>");
        assert!(html.contains("<h1>404</h1>"));
        assert!(html.contains("/nope&lt;script&gt;"));
    }
}
