//! Router construction: the static file router behind request tracing and
//! security headers.

use std::path::PathBuf;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::static_files;

/// Pages are static; scripts and the service worker come from the same
/// origin only.
const CSP: &str = "default-src 'self'; \
                   script-src 'self'; \
                   style-src 'self' 'unsafe-inline'; \
                   font-src 'self' data:; \
                   img-src 'self' data:; \
                   connect-src 'self'; \
                   worker-src 'self'; \
                   frame-ancestors 'none'";

/// Headers added to every response.
const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("content-security-policy", CSP),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "same-origin"),
];

/// Create the application router over a build output directory.
pub(crate) fn create_router(output_dir: PathBuf) -> Router {
    let mut router = static_files::static_router(output_dir);
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }
    router.layer(TraceLayer::new_for_http())
}
