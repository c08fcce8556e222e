//! Styled terminal output for the `bake` commands.

use bake_build::BuildReport;
use console::{Style, Term};

/// Color of a message line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tone {
    Plain,
    Success,
    Warning,
    Error,
    Heading,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Tone::Plain => Style::new(),
            Tone::Success => Style::new().green(),
            Tone::Warning => Style::new().yellow(),
            Tone::Error => Style::new().red(),
            Tone::Heading => Style::new().cyan().bold(),
        }
    }
}

/// Writes user-facing messages to stderr.
pub(crate) struct Output {
    term: Term,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    pub(crate) fn line(&self, tone: Tone, msg: &str) {
        let _ = self.term.write_line(&tone.style().apply_to(msg).to_string());
    }

    pub(crate) fn info(&self, msg: &str) {
        self.line(Tone::Plain, msg);
    }

    pub(crate) fn success(&self, msg: &str) {
        self.line(Tone::Success, msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.line(Tone::Error, msg);
    }

    pub(crate) fn heading(&self, msg: &str) {
        self.line(Tone::Heading, msg);
    }

    /// Print skipped source files, failed pages and a closing summary.
    pub(crate) fn build_report(&self, report: &BuildReport) {
        for (tone, msg) in report_lines(report) {
            self.line(tone, &msg);
        }
    }
}

fn report_lines(report: &BuildReport) -> Vec<(Tone, String)> {
    let mut lines = Vec::new();
    for failure in &report.load.failures {
        lines.push((
            Tone::Warning,
            format!("Skipped {}: {}", failure.path.display(), failure.message),
        ));
    }
    for failure in &report.failures {
        lines.push((
            Tone::Error,
            format!("Failed {}: {}", failure.path, failure.message),
        ));
    }

    let summary = format!(
        "{} pages and {} assets (version {})",
        report.pages, report.assets, report.manifest.version
    );
    if report.is_success() {
        lines.push((Tone::Success, format!("Built {summary}")));
    } else {
        lines.push((
            Tone::Error,
            format!("{} page(s) failed; wrote {summary}", report.failures.len()),
        ));
    }
    lines
}
