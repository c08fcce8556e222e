//! Fallback page for failed renders.

use std::fmt::Write;

use crate::Host;

/// Render the minimal error page.
///
/// The detail is only included for hosts that expose it.
pub(crate) fn render_error_page(host: Host, detail: &str) -> String {
    let mut html = String::with_capacity(512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<title>Error</title>\n");
    html.push_str("</head>\n<body>\n");
    html.push_str("<h1>Something went wrong</h1>\n");
    html.push_str("<p>This page could not be rendered.</p>\n");
    if host.shows_error_detail() {
        let _ = writeln!(html, "<pre>{}</pre>", escape(detail));
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// Escape text for HTML element and attribute content.
pub(crate) fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_host_includes_escaped_detail() {
        let html = render_error_page(Host::Build, "Template not found: <blog.html>");
        assert!(html.contains("<pre>Template not found: &lt;blog.html&gt;</pre>"));
    }

    #[test]
    fn test_browser_host_hides_detail() {
        let html = render_error_page(Host::Browser, "secret detail");
        assert!(!html.contains("secret detail"));
        assert!(!html.contains("<pre>"));
        assert!(html.contains("Something went wrong"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }
}
