//! Leading YAML front matter.

/// Fence line delimiting front matter.
const FENCE: &str = "---";

/// Split a document into its front matter block and body.
///
/// Front matter must start on the first line with a `---` fence and end at
/// the next line consisting only of `---`. Returns `None` for the block when
/// the document has no (or unterminated) front matter, in which case the body
/// is the whole input.
pub(crate) fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let Some(first_line_end) = source.find('\n') else {
        return (None, source);
    };
    if source[..first_line_end].trim_end_matches('\r') != FENCE {
        return (None, source);
    }

    let rest = &source[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }

    (None, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_front_matter() {
        let (front, body) = split_front_matter("---\ntitle: Hi\n---\n# Hi\n");
        assert_eq!(front, Some("title: Hi\n"));
        assert_eq!(body, "# Hi\n");
    }

    #[test]
    fn test_split_front_matter_crlf() {
        let (front, body) = split_front_matter("---\r\ntitle: Hi\r\n---\r\nbody");
        assert_eq!(front, Some("title: Hi\r\n"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_split_front_matter_empty_block() {
        let (front, body) = split_front_matter("---\n---\nbody");
        assert_eq!(front, Some(""));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_split_front_matter_closing_fence_at_eof() {
        let (front, body) = split_front_matter("---\na: 1\n---");
        assert_eq!(front, Some("a: 1\n"));
        assert_eq!(body, "");
    }

    #[test]
    fn test_no_front_matter() {
        let (front, body) = split_front_matter("# Title\n---\n");
        assert!(front.is_none());
        assert_eq!(body, "# Title\n---\n");
    }

    #[test]
    fn test_unterminated_front_matter() {
        let source = "---\ntitle: Hi\nno closing fence";
        let (front, body) = split_front_matter(source);
        assert!(front.is_none());
        assert_eq!(body, source);
    }

    #[test]
    fn test_bom_is_ignored() {
        let (front, body) = split_front_matter("\u{feff}---\na: 1\n---\nx");
        assert_eq!(front, Some("a: 1\n"));
        assert_eq!(body, "x");
    }
}
