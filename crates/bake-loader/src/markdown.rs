//! Markdown to HTML conversion.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};

/// Rendered markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rendered {
    /// HTML output.
    pub html: String,
    /// Plain text of the first level-1 heading, if any.
    pub title: Option<String>,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Convert markdown to HTML and extract the first H1 text.
pub(crate) fn render_markdown(source: &str) -> Rendered {
    let events: Vec<Event<'_>> = Parser::new_ext(source, options()).collect();

    let mut title: Option<String> = None;
    let mut in_h1 = false;
    let mut buf = String::new();
    for event in &events {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if title.is_none() => {
                in_h1 = true;
                buf.clear();
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_h1 => {
                in_h1 = false;
                let text = buf.trim();
                if !text.is_empty() {
                    title = Some(text.to_owned());
                }
            }
            Event::Text(text) | Event::Code(text) if in_h1 => buf.push_str(text),
            Event::SoftBreak | Event::HardBreak if in_h1 => buf.push(' '),
            _ => {}
        }
    }

    let mut html_out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut html_out, events.into_iter());

    Rendered {
        html: html_out,
        title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_heading_and_title() {
        let rendered = render_markdown("# Hi\n\nSome *text*.\n");
        assert_eq!(rendered.html, "<h1>Hi</h1>\n<p>Some <em>text</em>.</p>\n");
        assert_eq!(rendered.title.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_title_uses_first_h1_only() {
        let rendered = render_markdown("## Intro\n\n# First `code`\n\n# Second\n");
        assert_eq!(rendered.title.as_deref(), Some("First code"));
    }

    #[test]
    fn test_no_title() {
        assert!(render_markdown("plain paragraph").title.is_none());
    }

    #[test]
    fn test_tables_enabled() {
        let rendered = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(rendered.html.contains("<table>"));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let rendered = render_markdown("<div class=\"x\">raw</div>\n");
        assert!(rendered.html.contains("<div class=\"x\">raw</div>"));
    }
}
