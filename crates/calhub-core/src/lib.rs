//! Core types: sources, events, merged calendars, export, tracing

pub mod calendar;
pub mod event;
pub mod export;
pub mod slug;
pub mod source;
pub mod time;
pub mod tracing;

pub use calendar::{MergedCalendar, fingerprint};
pub use event::{Event, SourceTag};
pub use export::{EventView, FeedView, to_ics, to_json};
pub use slug::{is_valid_slug, slugify};
pub use source::{Calendar, Source, SourceError};
pub use time::TimeWindow;
pub use self::tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
