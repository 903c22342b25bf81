//! `calhub check`: validate the configuration.

use std::fmt::Write;
use std::path::Path;

use calhub_server::HubConfig;

use crate::error::CliResult;

pub fn run(config: &HubConfig, path: &Path) -> CliResult<()> {
    print!("{}", render(config, path)?);
    Ok(())
}

/// Summary of the calendars the configuration defines.
pub fn render(config: &HubConfig, path: &Path) -> CliResult<String> {
    config.validate()?;
    let calendars = config.calendars()?;

    let mut out = String::new();
    let _ = writeln!(out, "# {}", path.display());
    if calendars.is_empty() {
        let _ = writeln!(out, "No calendars configured.");
    }
    for calendar in &calendars {
        let _ = writeln!(
            out,
            "{} ({}): {} source(s)",
            calendar.slug,
            calendar.name,
            calendar.sources.len()
        );
        for source in &calendar.sources {
            let _ = writeln!(out, "  - {}", source.display_name());
        }
    }
    let _ = writeln!(out, "Configuration is valid.");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_calendars_and_sources() {
        let config = HubConfig::from_toml(
            r#"
[[calendars]]
name = "City Parks"

[[calendars.sources]]
url = "https://parks.example.org/events.ics"
label = "Parks Department"

[[calendars.sources]]
url = "https://library.example.org/events.ics"
"#,
        )
        .unwrap();

        let out = render(&config, Path::new("hub.toml")).unwrap();
        assert!(out.starts_with("# hub.toml\n"));
        assert!(out.contains("city-parks (City Parks): 2 source(s)"));
        assert!(out.contains("  - Parks Department"));
        assert!(out.ends_with("Configuration is valid.\n"));
    }

    #[test]
    fn empty_configuration() {
        let out = render(&HubConfig::default(), Path::new("hub.toml")).unwrap();
        assert!(out.contains("No calendars configured."));
    }
}
