//! Content lines: unfolding, folding and TEXT value escaping.

use super::CalendarError;

/// Maximum octets per physical line, excluding the line break.
const FOLD_WIDTH: usize = 75;

/// One logical `NAME;PARAMS:VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ContentLine {
    name: String,
    /// Everything between the name and the value separator, including the leading `;`.
    params: String,
    value: String,
    /// Physical lines as read; `None` once the value has been modified.
    raw: Option<Vec<String>>,
}

impl ContentLine {
    pub(super) fn new(name: &str, value: String) -> Self {
        Self {
            name: name.to_owned(),
            params: String::new(),
            value,
            raw: None,
        }
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    /// Raw (still escaped) value.
    pub(super) fn value(&self) -> &str {
        &self.value
    }

    pub(super) fn set_value(&mut self, value: String) {
        self.value = value;
        self.raw = None;
    }

    pub(super) fn write(&self, out: &mut String, ending: &str) {
        if let Some(raw) = &self.raw {
            for physical in raw {
                out.push_str(physical);
                out.push_str(ending);
            }
            return;
        }

        let logical = format!("{}{}:{}", self.name, self.params, self.value);
        fold_into(out, &logical, ending);
    }

    fn parse(logical: &str, physical: Vec<String>, number: usize) -> Result<Self, CalendarError> {
        let malformed = || CalendarError::MalformedLine { line: number };

        let name_end = logical.find([';', ':']).ok_or_else(malformed)?;
        let name = &logical[..name_end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(malformed());
        }

        // Parameter values may be quoted and contain ':'.
        let mut in_quotes = false;
        let mut value_sep = None;
        for (i, c) in logical[name_end..].char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ':' if !in_quotes => {
                    value_sep = Some(name_end + i);
                    break;
                }
                _ => {}
            }
        }
        let value_sep = value_sep.ok_or_else(malformed)?;

        Ok(Self {
            name: name.to_ascii_uppercase(),
            params: logical[name_end..value_sep].to_owned(),
            value: logical[value_sep + 1..].to_owned(),
            raw: Some(physical),
        })
    }
}

/// Join folded lines and parse each logical line.
///
/// Returned line numbers are 1-based and point at the first physical line.
/// Blank lines are dropped.
pub(super) fn unfold(input: &str) -> Result<Vec<(usize, ContentLine)>, CalendarError> {
    struct Pending {
        number: usize,
        logical: String,
        physical: Vec<String>,
    }

    let mut lines = Vec::new();
    let mut pending: Option<Pending> = None;

    for (index, physical) in input.split('\n').enumerate() {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        let number = index + 1;

        if let Some(continuation) = physical.strip_prefix([' ', '\t']) {
            let Some(current) = pending.as_mut() else {
                return Err(CalendarError::MalformedLine { line: number });
            };
            current.logical.push_str(continuation);
            current.physical.push(physical.to_owned());
            continue;
        }

        if let Some(done) = pending.take() {
            lines.push((done.number, ContentLine::parse(&done.logical, done.physical, done.number)?));
        }

        if !physical.is_empty() {
            pending = Some(Pending {
                number,
                logical: physical.to_owned(),
                physical: vec![physical.to_owned()],
            });
        }
    }

    if let Some(done) = pending {
        lines.push((done.number, ContentLine::parse(&done.logical, done.physical, done.number)?));
    }

    Ok(lines)
}

/// Write `logical` as one or more physical lines of at most [`FOLD_WIDTH`] octets.
fn fold_into(out: &mut String, logical: &str, ending: &str) {
    let mut width = 0;
    for c in logical.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str(ending);
            out.push(' ');
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str(ending);
}

/// Escape a TEXT value.
pub(super) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push_str("\\n");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Undo TEXT escaping. Unknown escapes are kept verbatim.
pub(super) fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(escaped @ ('\\' | ';' | ',')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_unescape_are_inverse() {
        let text = "Room 1, wing B; see \\notes\nnext line";
        let escaped = escape_text(text);
        assert_eq!(escaped, "Room 1\\, wing B\\; see \\\\notes\\nnext line");
        assert_eq!(unescape_text(&escaped), text);
    }

    #[test]
    fn unknown_escape_is_kept() {
        assert_eq!(unescape_text("a\\:b\\"), "a\\:b\\");
    }

    #[test]
    fn crlf_inside_value_becomes_single_newline() {
        assert_eq!(escape_text("a\r\nb\rc"), "a\\nb\\nc");
    }

    #[test]
    fn quoted_parameter_may_contain_colon() {
        let lines = unfold("ATTENDEE;CN=\"Dr: Who\":mailto:who@example.org\n").unwrap();
        let (number, line) = &lines[0];
        assert_eq!(*number, 1);
        assert_eq!(line.name(), "ATTENDEE");
        assert_eq!(line.value(), "mailto:who@example.org");
    }

    #[test]
    fn continuation_without_preceding_line_is_malformed() {
        assert_eq!(
            unfold(" orphan\n").unwrap_err(),
            CalendarError::MalformedLine { line: 1 }
        );
    }

    #[test]
    fn folding_respects_char_boundaries() {
        let mut out = String::new();
        let logical = format!("X:{}", "ő".repeat(80));
        fold_into(&mut out, &logical, "\n");

        let physical: Vec<_> = out.trim_end_matches('\n').split('\n').collect();
        assert!(physical.len() > 1);
        assert!(physical.iter().all(|line| line.len() <= FOLD_WIDTH));
        let unfolded: String = physical
            .iter()
            .enumerate()
            .map(|(i, line)| if i == 0 { *line } else { &line[1..] })
            .collect();
        assert_eq!(unfolded, logical);
    }
}
