//! Error types for fetching and parsing a single feed.
//!
//! A [`FeedError`] always concerns one source. The aggregation layer turns
//! it into a warning on the merged calendar unless every source failed.

use std::fmt;
use thiserror::Error;

/// The category of a feed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedErrorCode {
    /// The request did not complete within its timeout.
    Timeout,
    /// DNS, TCP, TLS or body transfer failure.
    ConnectionError,
    /// The server answered with a non-success status.
    HttpError,
    /// The response exceeded the configured size limit.
    TooLarge,
    /// The source URL cannot be requested.
    InvalidUrl,
    /// The body is not usable calendar data.
    ParseError,
}

impl FeedErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::HttpError => "http_error",
            Self::TooLarge => "too_large",
            Self::InvalidUrl => "invalid_url",
            Self::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for FeedErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while fetching or parsing one feed.
#[derive(Debug, Clone, Error)]
pub struct FeedError {
    code: FeedErrorCode,
    message: String,
    /// URL of the source involved.
    url: Option<String>,
    /// HTTP status, for [`FeedErrorCode::HttpError`].
    status: Option<u16>,
}

impl FeedError {
    pub fn new(code: FeedErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            url: None,
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::ConnectionError, message)
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16) -> Self {
        let mut err = Self::new(FeedErrorCode::HttpError, format!("upstream returned HTTP {status}"));
        err.status = Some(status);
        err
    }

    pub fn too_large(limit: usize) -> Self {
        Self::new(
            FeedErrorCode::TooLarge,
            format!("response exceeds {limit} bytes"),
        )
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InvalidUrl, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::ParseError, message)
    }

    /// Attaches the source URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn code(&self) -> FeedErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Timeouts and 5xx responses are worth another attempt; everything
    /// else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        match self.code {
            FeedErrorCode::Timeout => true,
            FeedErrorCode::HttpError => self.status.is_some_and(|s| (500..600).contains(&s)),
            _ => false,
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref url) = self.url {
            write!(f, "[{}] ", url)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
