//! Source fragments attached to lambdas and errors.

use core::fmt;
use core::ops::Range;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Byte range inside a source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span(pub Range<usize>);

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span(start..end.max(start))
    }
}

/// A fragment of a script: the full text it lives in, the span of the
/// fragment, and a short content hash used to identify it in error chains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSegment {
    text: Arc<str>,
    span: Span,
    file: Option<Arc<str>>,
    hash: String,
}

impl SourceSegment {
    /// Creates a segment over `span` of `text`. The span is clamped to the text.
    pub fn new(text: impl Into<Arc<str>>, span: Range<usize>) -> Self {
        let text = text.into();
        let end = span.end.min(text.len());
        let start = span.start.min(end);
        let fragment = text.get(start..end).unwrap_or("");
        let hash = short_hash(fragment);
        Self {
            text,
            span: Span(start..end),
            file: None,
            hash,
        }
    }

    /// A segment covering all of `text`.
    pub fn whole(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let len = text.len();
        Self::new(text, 0..len)
    }

    pub fn with_file(mut self, file: impl Into<Arc<str>>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Narrows this segment to `span`, keeping text and file.
    pub fn slice(&self, span: Range<usize>) -> Self {
        let mut segment = Self::new(self.text.clone(), span);
        segment.file = self.file.clone();
        segment
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn fragment(&self) -> &str {
        self.text.get(self.span.0.clone()).unwrap_or("")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn short_hash(&self) -> &str {
        &self.hash
    }

    /// Name used when rendering: the file if known, else `<script>`.
    pub fn name(&self) -> &str {
        self.file().unwrap_or("<script>")
    }

    /// 1-based line of the fragment start.
    pub fn line(&self) -> usize {
        let prefix = self.text.get(..self.span.0.start).unwrap_or("");
        prefix.matches('\n').count() + 1
    }
}

impl fmt::Display for SourceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}) [{}]",
            self.fragment(),
            self.name(),
            self.line(),
            self.hash
        )
    }
}

/// First 8 hex digits of the SHA-256 of `text`.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}

/// Full hex SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
