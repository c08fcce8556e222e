//! Static file serving over the build output.
//!
//! Files are served as-is by `tower-http`'s `ServeDir`; directories serve
//! their `index.html`. Requests that match no file fall back to the page
//! routing rules of the runtime, so `/blog/post` serves `blog/post.html`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use bake_runtime::{normalize_route, not_found_page};
use tower_http::services::ServeDir;

/// Create router serving `root`.
pub(crate) fn static_router(root: PathBuf) -> Router {
    let pages = Arc::new(root.clone());
    let fallback = move |uri: Uri| {
        let root = Arc::clone(&pages);
        async move { serve_page(&root, uri.path()).await }
    };

    let files = ServeDir::new(root)
        .append_index_html_on_directories(true)
        .fallback(fallback.into_service());
    Router::new().fallback_service(files)
}

/// Serve the rendered page for a route without its `.html` suffix.
async fn serve_page(root: &Path, path: &str) -> Response {
    if let Some(file) = page_file(root, path) {
        match tokio::fs::read_to_string(&file).await {
            Ok(html) => return Html(html).into_response(),
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to read page");
            }
            Err(_) => {}
        }
    }
    (StatusCode::NOT_FOUND, Html(not_found_page(path))).into_response()
}

/// Output file for a route, if the route is a plain relative path.
fn page_file(root: &Path, path: &str) -> Option<PathBuf> {
    let route = normalize_route(path);
    let plain = !route.is_empty()
        && !route.contains('\\')
        && route
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    plain.then(|| root.join(format!("{route}.html")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_file() {
        let root = Path::new("/out");
        assert_eq!(
            page_file(root, "/blog/post"),
            Some(PathBuf::from("/out/blog/post.html"))
        );
        assert_eq!(
            page_file(root, "/about/?q=1"),
            Some(PathBuf::from("/out/about.html"))
        );
        assert_eq!(page_file(root, "/"), None);
        assert_eq!(page_file(root, "/a/../../secret"), None);
        assert_eq!(page_file(root, "/a//b"), None);
        assert_eq!(page_file(root, "/a\\b"), None);
    }
}
