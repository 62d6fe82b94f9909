//! Reporting of unhandled errors to the host.
//!
//! When an error reaches the root scope without a handler, the runtime
//! hands a [`Report`] to its [`ErrorSink`] before deciding (from
//! `fail_fast`) whether to surface it as `Err` or as an error value.

use std::sync::Mutex;

use crate::errors::{Error, ErrorKind};
use crate::source::SourceSegment;
use crate::sync::lock;

/// An unhandled error as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ErrorKind,
    pub message: String,
    /// Innermost source fragment, if the error passed through any.
    pub fragment: Option<String>,
    /// Short hash of that fragment.
    pub hash: Option<String>,
    /// Every fragment the error passed through, innermost first.
    pub sources: Vec<SourceSegment>,
}

impl From<&Error> for Report {
    fn from(error: &Error) -> Self {
        let first = error.sources().first();
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
            fragment: first.map(|s| s.fragment().to_string()),
            hash: first.map(|s| s.short_hash().to_string()),
            sources: error.sources().to_vec(),
        }
    }
}

/// Receives unhandled errors from the root scope.
pub trait ErrorSink: Send + Sync {
    fn report(&self, report: &Report);
}

/// Default sink: logs each report at error level.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, report: &Report) {
        tracing::error!(
            kind = report.kind.name(),
            fragment = report.fragment.as_deref().unwrap_or(""),
            hash = report.hash.as_deref().unwrap_or(""),
            "{}",
            report.message
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Report>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        lock(&self.reports).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.reports).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.reports).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.reports).clear();
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, report: &Report) {
        lock(&self.reports).push(report.clone());
    }
}
