//! Aggregation, merge and configuration error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for aggregation operations.
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned by [`Aggregator::get_calendar`](crate::Aggregator::get_calendar).
///
/// `Clone` so one in-flight refresh can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AggregationError {
    /// The slug is not a configured calendar.
    #[error("calendar not found: {slug}")]
    NotFound { slug: String },

    /// Every source failed and nothing was cached.
    #[error("all sources of '{slug}' failed: {}", .failures.join("; "))]
    AggregationFailed { slug: String, failures: Vec<String> },

    /// Merged output broke an internal invariant.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// A cold request gave up waiting. The refresh keeps running.
    #[error("timed out after {waited:?} waiting for '{slug}'")]
    Timeout { slug: String, waited: Duration },

    /// The refresh task ended without producing a result.
    #[error("refresh of '{slug}' aborted: {reason}")]
    RefreshAborted { slug: String, reason: String },
}

impl AggregationError {
    pub fn not_found(slug: impl Into<String>) -> Self {
        Self::NotFound { slug: slug.into() }
    }

    pub fn aggregation_failed(slug: impl Into<String>, failures: Vec<String>) -> Self {
        Self::AggregationFailed {
            slug: slug.into(),
            failures,
        }
    }

    pub fn timeout(slug: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            slug: slug.into(),
            waited,
        }
    }

    pub fn refresh_aborted(slug: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RefreshAborted {
            slug: slug.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for [`AggregationError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Internal invariant violations in the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("merge invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for the configuration model.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but describes an unusable setup.
    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_failed_lists_failures() {
        let err = AggregationError::aggregation_failed(
            "parks",
            vec!["a: timeout".into(), "b: http_error".into()],
        );
        assert_eq!(
            err.to_string(),
            "all sources of 'parks' failed: a: timeout; b: http_error"
        );
    }

    #[test]
    fn merge_error_is_transparent() {
        let err: AggregationError = MergeError::InvariantViolation("end before start".into()).into();
        assert_eq!(err.to_string(), "merge invariant violated: end before start");
        assert!(!err.is_not_found());
        assert!(AggregationError::not_found("x").is_not_found());
    }
}
