//! Component tree reading.
//!
//! The document is handed to the icalendar parser as a whole first. When
//! that fails or loses components, the top-level components are cut out one
//! by one and parsed separately so a single broken VEVENT only costs that
//! event.

use icalendar::parser::{Component as ParsedComponent, Property as ParsedProperty, read_calendar, unfold};
use tracing::debug;

/// An owned component with upper-cased names.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Prop>,
    pub children: Vec<Node>,
}

/// An owned content line.
#[derive(Debug, Clone, Default)]
pub struct Prop {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Node {
    /// First property with the given name.
    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Every property with the given name.
    pub fn props<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Prop> {
        self.properties.iter().filter(move |p| p.name == name)
    }

    /// Value of the first property with the given name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.prop(name).map(|p| p.value.as_str())
    }
}

impl Prop {
    /// Parameter value with surrounding quotes removed.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

/// Result of reading a document's components.
#[derive(Debug, Default)]
pub struct ComponentTree {
    /// Children of VCALENDAR.
    pub components: Vec<Node>,
    /// `X-WR-CALNAME`, if present.
    pub calendar_name: Option<String>,
    /// Top-level components that could not be parsed at all.
    pub rejected: Vec<Rejected>,
}

/// A component the icalendar parser refused.
#[derive(Debug)]
pub struct Rejected {
    pub name: String,
    pub reason: String,
}

/// Reads the component tree of an iCalendar document.
pub fn read_components(text: &str) -> ComponentTree {
    let unfolded = unfold(text);
    let calendar_name = calendar_property(&unfolded, "X-WR-CALNAME");
    let chunks = split_components(&unfolded);

    // The whole-document parse is only trusted when it saw every component.
    match read_calendar(&unfolded) {
        Ok(calendar) if calendar.components.len() == chunks.len() => {
            return ComponentTree {
                components: calendar.components.iter().map(to_node).collect(),
                calendar_name,
                rejected: Vec::new(),
            };
        }
        Ok(calendar) => debug!(
            parsed = calendar.components.len(),
            expected = chunks.len(),
            "Whole-document parse lost components, parsing them one by one"
        ),
        Err(err) => debug!(error = %err, "Whole-document parse failed, parsing components one by one"),
    }

    let mut tree = ComponentTree {
        calendar_name,
        ..ComponentTree::default()
    };
    for chunk in chunks {
        let wrapped = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{}END:VCALENDAR\r\n",
            chunk.text
        );
        match read_calendar(&wrapped) {
            Ok(calendar) if !calendar.components.is_empty() => tree
                .components
                .extend(calendar.components.iter().map(to_node)),
            Ok(_) => tree.rejected.push(Rejected {
                name: chunk.name,
                reason: "component could not be read".to_string(),
            }),
            Err(err) => tree.rejected.push(Rejected {
                name: chunk.name,
                reason: err.to_string(),
            }),
        }
    }
    tree
}

fn to_node(component: &ParsedComponent<'_>) -> Node {
    Node {
        name: component.name.to_string().to_ascii_uppercase(),
        properties: component.properties.iter().map(to_prop).collect(),
        children: component.components.iter().map(to_node).collect(),
    }
}

fn to_prop(property: &ParsedProperty<'_>) -> Prop {
    Prop {
        name: property.name.to_string().to_ascii_uppercase(),
        params: property
            .params
            .iter()
            .map(|p| {
                (
                    p.key.to_string().to_ascii_uppercase(),
                    p.val.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                )
            })
            .collect(),
        value: property.val.to_string(),
    }
}

struct Chunk {
    name: String,
    text: String,
}

/// Cuts the direct children of VCALENDAR out of an unfolded document.
fn split_components(unfolded: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<Chunk> = None;

    for line in unfolded.lines() {
        let trimmed = line.trim_end_matches('\r');
        let upper = trimmed.to_ascii_uppercase();

        if let Some(name) = upper.strip_prefix("BEGIN:") {
            depth += 1;
            if depth == 2 {
                current = Some(Chunk {
                    name: name.trim().to_string(),
                    text: String::new(),
                });
            }
        }

        if depth >= 2
            && let Some(chunk) = current.as_mut()
        {
            chunk.text.push_str(trimmed);
            chunk.text.push_str("\r\n");
        }

        if upper.starts_with("END:") {
            if depth == 2
                && let Some(chunk) = current.take()
            {
                chunks.push(chunk);
            }
            depth = depth.saturating_sub(1);
        }
    }

    chunks
}

/// Finds a property set directly on VCALENDAR.
fn calendar_property(unfolded: &str, name: &str) -> Option<String> {
    let mut depth = 0usize;
    for line in unfolded.lines() {
        let trimmed = line.trim_end_matches('\r');
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("BEGIN:") {
            depth += 1;
            continue;
        }
        if upper.starts_with("END:") {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth != 1 {
            continue;
        }
        let Some((head, value)) = trimmed.split_once(':') else {
            continue;
        };
        let prop_name = head.split(';').next().unwrap_or(head);
        if prop_name.eq_ignore_ascii_case(name) && !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_EVENTS: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//EN\r\n\
X-WR-CALNAME:Parks\r\n\
BEGIN:VEVENT\r\n\
UID:one\r\n\
DTSTART:20240101T100000Z\r\n\
SUMMARY:First\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:two\r\n\
DTSTART;TZID=Europe/Paris:20240102T100000\r\n\
SUMMARY:Second\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT15M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn reads_components_and_params() {
        let tree = read_components(TWO_EVENTS);
        assert!(tree.rejected.is_empty());
        assert_eq!(tree.calendar_name.as_deref(), Some("Parks"));

        let events: Vec<_> = tree.components.iter().filter(|c| c.name == "VEVENT").collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value("UID"), Some("one"));

        let start = events[1].prop("DTSTART").unwrap();
        assert_eq!(start.param("TZID"), Some("Europe/Paris"));
        assert_eq!(start.value, "20240102T100000");
        assert_eq!(events[1].children.len(), 1);
        assert_eq!(events[1].children[0].name, "VALARM");
    }

    #[test]
    fn split_keeps_nested_components_together() {
        let unfolded = unfold(TWO_EVENTS);
        let chunks = split_components(&unfolded);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "VEVENT");
        assert!(chunks[1].text.contains("BEGIN:VALARM"));
        assert!(chunks[1].text.ends_with("END:VEVENT\r\n"));
    }

    #[test]
    fn calendar_name_ignores_nested_properties() {
        let doc = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nX-WR-CALNAME:Wrong\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        assert_eq!(calendar_property(doc, "X-WR-CALNAME"), None);
    }

    #[test]
    fn quoted_params_are_unquoted() {
        let prop = Prop {
            name: "DTSTART".into(),
            params: vec![("TZID".into(), "\"America/New_York\"".into())],
            value: "20240101T090000".into(),
        };
        assert_eq!(prop.param("TZID"), Some("America/New_York"));
    }
}
