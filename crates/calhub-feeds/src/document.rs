//! Raw fetched documents.

use std::borrow::Cow;
use std::sync::Arc;

use calhub_core::Source;
use chrono::{DateTime, Utc};

/// A fetched feed body plus fetch metadata. Discarded after parsing.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Source the body was fetched from.
    pub source: Source,
    /// Response body.
    pub body: Arc<[u8]>,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// HTTP status of the final response.
    pub status: u16,
    /// The body was reused after a `304 Not Modified`.
    pub not_modified: bool,
}

impl RawDocument {
    /// A `200 OK` document fetched now.
    pub fn new(source: Source, body: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source,
            body: body.into(),
            fetched_at: Utc::now(),
            status: 200,
            not_modified: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_not_modified(mut self, not_modified: bool) -> Self {
        self.not_modified = not_modified;
        self
    }

    /// Body as text, invalid UTF-8 replaced and a leading BOM removed.
    pub fn text(&self) -> Cow<'_, str> {
        let body = self.body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.body[..]);
        String::from_utf8_lossy(body)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
