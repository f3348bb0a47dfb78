//! Minimal iCalendar (RFC 5545) document model.
//!
//! Only what enrichment needs: a tree of `BEGIN`/`END` components holding
//! content lines, text property get/set, and serialization. Properties that
//! are never modified are written back exactly as they were read (including
//! their original line folding), so an untouched document round-trips
//! byte-for-byte.

mod line;

use line::{ContentLine, escape_text, unescape_text};

/// Name of the event component.
pub const VEVENT: &str = "VEVENT";
/// Name of the top-level calendar component.
pub const VCALENDAR: &str = "VCALENDAR";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("document contains no content lines")]
    Empty,
    #[error("line {line}: malformed content line")]
    MalformedLine { line: usize },
    #[error("line {line}: END:{found} does not close BEGIN:{expected}")]
    MismatchedEnd {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: END:{name} without a matching BEGIN")]
    UnexpectedEnd { line: usize, name: String },
    #[error("component {name} opened on line {line} is never closed")]
    Unterminated { line: usize, name: String },
    #[error("no VCALENDAR component found")]
    NoCalendar,
}

/// A property or a nested component, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Property(ContentLine),
    Component(Component),
}

/// A `BEGIN:<NAME>` ... `END:<NAME>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    name: String,
    begin: ContentLine,
    end: ContentLine,
    children: Vec<Node>,
}

impl Component {
    /// Upper-cased component name, e.g. `VEVENT`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unescaped text of the first direct property called `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.properties()
            .find(|line| line.name().eq_ignore_ascii_case(name))
            .map(|line| unescape_text(line.value()))
    }

    /// Set the text value of the first direct property called `name`,
    /// adding the property if the component has none.
    ///
    /// Parameters of an existing property are kept.
    pub fn set(&mut self, name: &str, value: &str) {
        let escaped = escape_text(value);

        let existing = self.children.iter_mut().find_map(|node| match node {
            Node::Property(line) if line.name().eq_ignore_ascii_case(name) => Some(line),
            _ => None,
        });
        if let Some(line) = existing {
            line.set_value(escaped);
            return;
        }

        // New properties go after the existing ones, ahead of any sub-component.
        let position = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Component(_)))
            .unwrap_or(self.children.len());
        self.children.insert(
            position,
            Node::Property(ContentLine::new(&name.to_ascii_uppercase(), escaped)),
        );
    }

    /// Direct sub-components, e.g. the `VALARM`s of an event.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.children.iter().filter_map(|node| match node {
            Node::Component(component) => Some(component),
            Node::Property(_) => None,
        })
    }

    fn properties(&self) -> impl Iterator<Item = &ContentLine> {
        self.children.iter().filter_map(|node| match node {
            Node::Property(line) => Some(line),
            Node::Component(_) => None,
        })
    }

    fn write(&self, out: &mut String, ending: &str) {
        self.begin.write(out, ending);
        for child in &self.children {
            child.write(out, ending);
        }
        self.end.write(out, ending);
    }
}

impl Node {
    fn write(&self, out: &mut String, ending: &str) {
        match self {
            Node::Property(line) => line.write(out, ending),
            Node::Component(component) => component.write(out, ending),
        }
    }
}

/// A parsed calendar document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    nodes: Vec<Node>,
    line_ending: &'static str,
    trailing_line_ending: bool,
}

impl Calendar {
    /// Parse a whole `.ics` document.
    pub fn parse(input: &str) -> Result<Self, CalendarError> {
        let line_ending = if input.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_line_ending = input.ends_with('\n');

        let lines = line::unfold(input)?;
        if lines.is_empty() {
            return Err(CalendarError::Empty);
        }

        let mut nodes = Vec::new();
        // (line number of BEGIN, component under construction)
        let mut stack: Vec<(usize, Component)> = Vec::new();

        for (number, line) in lines {
            if line.name().eq_ignore_ascii_case("BEGIN") {
                let name = line.value().trim().to_ascii_uppercase();
                stack.push((
                    number,
                    Component {
                        name,
                        end: line.clone(),
                        begin: line,
                        children: Vec::new(),
                    },
                ));
            } else if line.name().eq_ignore_ascii_case("END") {
                let name = line.value().trim().to_ascii_uppercase();
                let Some((_, mut component)) = stack.pop() else {
                    return Err(CalendarError::UnexpectedEnd { line: number, name });
                };
                if component.name != name {
                    return Err(CalendarError::MismatchedEnd {
                        line: number,
                        expected: component.name,
                        found: name,
                    });
                }
                component.end = line;
                let node = Node::Component(component);
                match stack.last_mut() {
                    Some((_, parent)) => parent.children.push(node),
                    None => nodes.push(node),
                }
            } else {
                let node = Node::Property(line);
                match stack.last_mut() {
                    Some((_, parent)) => parent.children.push(node),
                    None => nodes.push(node),
                }
            }
        }

        if let Some((line, component)) = stack.pop() {
            return Err(CalendarError::Unterminated {
                line,
                name: component.name,
            });
        }

        let has_calendar = nodes
            .iter()
            .any(|node| matches!(node, Node::Component(c) if c.name == VCALENDAR));
        if !has_calendar {
            return Err(CalendarError::NoCalendar);
        }

        Ok(Self {
            nodes,
            line_ending,
            trailing_line_ending,
        })
    }

    /// Every `VEVENT`, at any depth, in document order.
    pub fn events(&self) -> Vec<&Component> {
        let mut out = Vec::new();
        collect(&self.nodes, VEVENT, &mut out);
        out
    }

    /// Mutable access to every `VEVENT`, at any depth, in document order.
    pub fn events_mut(&mut self) -> Vec<&mut Component> {
        let mut out = Vec::new();
        collect_mut(&mut self.nodes, VEVENT, &mut out);
        out
    }

    /// Write the document back out using its original line endings.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write(&mut out, self.line_ending);
        }
        if !self.trailing_line_ending && out.ends_with(self.line_ending) {
            out.truncate(out.len() - self.line_ending.len());
        }
        out
    }
}

fn collect<'a>(nodes: &'a [Node], name: &str, out: &mut Vec<&'a Component>) {
    for node in nodes {
        if let Node::Component(component) = node {
            if component.name == name {
                out.push(component);
            } else {
                collect(&component.children, name, out);
            }
        }
    }
}

fn collect_mut<'a>(nodes: &'a mut [Node], name: &str, out: &mut Vec<&'a mut Component>) {
    for node in nodes {
        if let Node::Component(component) = node {
            if component.name == name {
                out.push(component);
            } else {
                collect_mut(&mut component.children, name, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Neptun//Timetable//HU\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Budapest\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:1@example\r\n\
SUMMARY:Cardiology lecture\\, part 1\r\n\
LOCATION:NET.01.101\r\n\
DESCRIPTION:A long description that was folded by the exporting app \r\n \
because it exceeded seventy-five octets\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
DESCRIPTION:Reminder\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:2@example\r\n\
SUMMARY:Free slot\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn untouched_document_round_trips_exactly() {
        let calendar = Calendar::parse(SAMPLE).unwrap();
        assert_eq!(calendar.serialize(), SAMPLE);
    }

    #[test]
    fn lf_document_without_trailing_newline_round_trips() {
        let input = "BEGIN:VCALENDAR\nVERSION:2.0\nBEGIN:VEVENT\nUID:x\nEND:VEVENT\nEND:VCALENDAR";
        let calendar = Calendar::parse(input).unwrap();
        assert_eq!(calendar.serialize(), input);
    }

    #[test]
    fn events_are_listed_in_document_order() {
        let calendar = Calendar::parse(SAMPLE).unwrap();
        let uids: Vec<_> = calendar
            .events()
            .iter()
            .map(|event| event.get("UID").unwrap())
            .collect();
        assert_eq!(uids, ["1@example", "2@example"]);
    }

    #[test]
    fn get_unescapes_and_unfolds() {
        let calendar = Calendar::parse(SAMPLE).unwrap();
        let event = calendar.events()[0];
        assert_eq!(event.get("summary").as_deref(), Some("Cardiology lecture, part 1"));
        assert_eq!(
            event.get("DESCRIPTION").as_deref(),
            Some(
                "A long description that was folded by the exporting app because it exceeded seventy-five octets"
            )
        );
        assert_eq!(event.get("LOCATION").as_deref(), Some("NET.01.101"));
        assert_eq!(event.get("GEO"), None);
    }

    #[test]
    fn get_ignores_nested_components() {
        let calendar = Calendar::parse(SAMPLE).unwrap();
        let second = calendar.events()[1];
        assert_eq!(second.get("DESCRIPTION"), None);
        assert_eq!(calendar.events()[0].components().count(), 1);
    }

    #[test]
    fn set_replaces_existing_property_in_place() {
        let mut calendar = Calendar::parse(SAMPLE).unwrap();
        calendar.events_mut()[0].set("LOCATION", "1094 Budapest, Tömő 25-29");

        let out = calendar.serialize();
        assert!(out.contains("SUMMARY:Cardiology lecture\\, part 1\r\nLOCATION:1094 Budapest\\, Tömő 25-29\r\n"));
        assert!(!out.contains("NET.01.101"));

        let reparsed = Calendar::parse(&out).unwrap();
        assert_eq!(
            reparsed.events()[0].get("LOCATION").as_deref(),
            Some("1094 Budapest, Tömő 25-29")
        );
    }

    #[test]
    fn set_inserts_missing_property_before_sub_components() {
        let mut calendar = Calendar::parse(SAMPLE).unwrap();
        calendar.events_mut()[1].set("DESCRIPTION", "line one\nline two");

        let out = calendar.serialize();
        assert!(out.contains("SUMMARY:Free slot\r\nDESCRIPTION:line one\\nline two\r\nEND:VEVENT"));
        let reparsed = Calendar::parse(&out).unwrap();
        assert_eq!(
            reparsed.events()[1].get("DESCRIPTION").as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn set_keeps_parameters() {
        let input = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nLOCATION;LANGUAGE=hu:NET.01.101\nEND:VEVENT\nEND:VCALENDAR\n";
        let mut calendar = Calendar::parse(input).unwrap();
        calendar.events_mut()[0].set("LOCATION", "1094 Budapest");
        assert!(calendar.serialize().contains("LOCATION;LANGUAGE=hu:1094 Budapest\n"));
    }

    #[test]
    fn long_values_are_folded_on_write() {
        let mut calendar = Calendar::parse(SAMPLE).unwrap();
        let long = "é".repeat(100);
        calendar.events_mut()[1].set("DESCRIPTION", &long);

        let out = calendar.serialize();
        for physical in out.split("\r\n") {
            assert!(physical.len() <= 75, "line too long: {physical:?}");
        }
        let reparsed = Calendar::parse(&out).unwrap();
        assert_eq!(reparsed.events()[1].get("DESCRIPTION"), Some(long));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Calendar::parse(""), Err(CalendarError::Empty));
        assert_eq!(
            Calendar::parse("BEGIN:VCALENDAR\nBEGIN:VEVENT\nEND:VCALENDAR\n"),
            Err(CalendarError::MismatchedEnd {
                line: 3,
                expected: "VEVENT".into(),
                found: "VCALENDAR".into()
            })
        );
        assert_eq!(
            Calendar::parse("BEGIN:VCALENDAR\nVERSION:2.0\n"),
            Err(CalendarError::Unterminated {
                line: 1,
                name: "VCALENDAR".into()
            })
        );
        assert_eq!(
            Calendar::parse("END:VCALENDAR\n"),
            Err(CalendarError::UnexpectedEnd {
                line: 1,
                name: "VCALENDAR".into()
            })
        );
        assert_eq!(
            Calendar::parse("BEGIN:VCARD\nEND:VCARD\n"),
            Err(CalendarError::NoCalendar)
        );
        assert_eq!(
            Calendar::parse("BEGIN:VCALENDAR\nnot a content line\nEND:VCALENDAR\n"),
            Err(CalendarError::MalformedLine { line: 2 })
        );
    }
}
