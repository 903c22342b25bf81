//! `calhub feed`: aggregate one calendar and print it.

use std::path::Path;

use calhub_core::{MergedCalendar, to_ics, to_json};
use calhub_server::HubConfig;
use tracing::info;

use crate::cli::OutputFormat;
use crate::commands::build_aggregator;
use crate::error::CliResult;

pub async fn run(
    config: &HubConfig,
    slug: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> CliResult<()> {
    let aggregator = build_aggregator(config)?;
    let calendar = aggregator.get_calendar(slug).await?;
    let rendered = render(&calendar, format)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), events = calendar.len(), "Wrote calendar");
        }
        None => println!("{rendered}"),
    }

    for warning in &calendar.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// Renders a merged calendar in the requested format.
pub fn render(calendar: &MergedCalendar, format: OutputFormat) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Ics => to_ics(calendar),
        OutputFormat::Json => to_json(calendar)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn renders_both_formats() {
        let calendar = MergedCalendar::new("parks", "City Parks", Vec::new(), Vec::new(), Utc::now());

        let ics = render(&calendar, OutputFormat::Ics).unwrap();
        assert!(ics.contains("BEGIN:VCALENDAR"));

        let json = render(&calendar, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["slug"], "parks");
        assert_eq!(value["events"].as_array().map(Vec::len), Some(0));
    }
}
