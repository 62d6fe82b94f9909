//! Error rendering using ariadne
//!
//! Errors carry the source fragments they passed through, innermost first.
//! The innermost fragment becomes the primary label; outer fragments of the
//! same script are shown as secondary labels, the rest as notes.

use crate::Error;
use crate::api::{ErrorSink, Report};
use ariadne::{ColorGenerator, Config, IndexType, Label, ReportKind, Source};
use std::io::Write;

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use dollar::{Runtime, RuntimeOptions, Value, lambda, render_error};
///
/// let runtime = Runtime::new(RuntimeOptions { fail_fast: true, ..Default::default() }, |_| {});
/// let scope = runtime.root_scope("1 / nope");
/// let failing = lambda::wrap(&scope, vec![], "/", |scope| scope.get("nope", true));
/// if let Err(e) = failing.fix(false) {
///     render_error(&e);
/// }
/// ```
pub fn render_error(error: &Error) {
    render_report_to_writer(&Report::from(error), &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(error: &Error, writer: &mut dyn Write) -> std::io::Result<()> {
    render_report_to_writer(&Report::from(error), writer, true)
}

/// Render an error to a String (useful for logs, web UIs, etc.)
pub fn render_error_to_string(error: &Error) -> String {
    render_report_to_string(&Report::from(error), true)
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error) -> String {
    render_report_to_string(&Report::from(error), false)
}

/// Render a sink report to a String.
pub fn render_report_to_string(report: &Report, use_color: bool) -> String {
    let mut buf = Vec::new();
    render_report_to_writer(report, &mut buf, use_color).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_report_to_writer(
    report: &Report,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let Some(primary) = report.sources.first() else {
        return writeln!(
            writer,
            "[{}] {}: {}",
            report.kind.code(),
            report.kind,
            report.message
        );
    };

    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    let name = primary.name();
    let mut builder = ariadne::Report::build(ReportKind::Error, (name, primary.span().0.clone()))
        .with_code(report.kind.code())
        .with_message(format!("{}: {}", report.kind, report.message))
        .with_config(
            Config::default()
                .with_color(use_color)
                .with_index_type(IndexType::Byte),
        );

    builder = builder.with_label(
        Label::new((name, primary.span().0.clone()))
            .with_message(&report.message)
            .with_color(colors.next()),
    );

    // Outer fragments, as breadcrumbs back to where evaluation started.
    for outer in &report.sources[1..] {
        if outer.text() == primary.text() && outer.name() == name {
            builder = builder.with_label(
                Label::new((name, outer.span().0.clone()))
                    .with_message(format!("while evaluating `{}`", outer.fragment()))
                    .with_color(colors.next()),
            );
        } else {
            builder = builder.with_note(format!("while evaluating {}", outer));
        }
    }

    builder
        .finish()
        .write((name, Source::from(primary.text())), &mut *writer)
}

/// An [`ErrorSink`] that renders every report to stderr.
#[derive(Debug, Default)]
pub struct StderrSink {
    pub use_color: bool,
}

impl ErrorSink for StderrSink {
    fn report(&self, report: &Report) {
        render_report_to_writer(report, &mut std::io::stderr(), self.use_color).ok();
    }
}
