//! Log output setup shared by the calhub binaries.
//!
//! An explicit filter wins, then `RUST_LOG`; otherwise every `calhub_*`
//! target logs at the configured level and dependencies stay at `warn`.
//!
//! ```ignore
//! use calhub_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::service())?;
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

/// Targets the default directive raises to the configured level.
const CALHUB_TARGETS: &[&str] = &["calhub_core", "calhub_feeds", "calhub_server", "calhub_cli", "calhub"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format '{0}' (expected pretty, compact or json)")]
    UnknownFormat(String),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading in a terminal.
    Pretty,
    /// One line per event on stderr.
    #[default]
    Compact,
    /// One JSON object per event, with the current span (slug, source).
    Json,
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for calhub targets.
    pub level: Level,
    pub format: LogFormat,
    /// Adds file, line and target to every event, and logs refresh spans
    /// opening and closing.
    pub verbose: bool,
    /// Filter directive overriding both `RUST_LOG` and the default.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            verbose: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Terminal use: quiet unless `debug`.
    #[must_use]
    pub fn cli(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::WARN },
            verbose: debug,
            ..Self::default()
        }
    }

    /// Long-running aggregation service feeding a log shipper.
    #[must_use]
    pub fn service() -> Self {
        Self {
            format: LogFormat::Json,
            verbose: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// `warn` for everything, the configured level for calhub targets.
    pub fn default_directive(&self) -> String {
        let level = self.level.as_str();
        std::iter::once("warn".to_string())
            .chain(CALHUB_TARGETS.iter().map(|target| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        let directive = match &self.filter {
            Some(directive) => directive.clone(),
            None => match std::env::var(EnvFilter::DEFAULT_ENV) {
                Ok(directive) if !directive.trim().is_empty() => directive,
                _ => self.default_directive(),
            },
        };
        Ok(EnvFilter::try_new(directive)?)
    }
}

/// Installs the global subscriber. Call once per process.
///
/// # Errors
///
/// Fails when a subscriber is already installed or the filter is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let verbose = config.verbose;
    let spans = if verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let output = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(verbose)
            .with_line_number(verbose)
            .with_target(verbose)
            .with_span_events(spans)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .with_file(verbose)
            .with_line_number(verbose)
            .with_span_events(spans)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(verbose)
            .with_line_number(verbose)
            .with_span_events(spans)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;
    Ok(())
}
