//! Rewriting event locations from the classroom reference table.

use crate::calendar::Component;
use crate::reference::{LookupMode, ReferenceRow, ReferenceTable};
use serde::Serialize;

const LOCATION: &str = "LOCATION";
const DESCRIPTION: &str = "DESCRIPTION";

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// No (or an empty) `LOCATION`; left untouched.
    NoLocation,
    /// The full location matched a classroom code.
    Matched,
    /// Only a shortened location matched.
    Approximate,
    /// Nothing matched; left untouched.
    Unmatched,
}

/// Per-document tally of [`EventOutcome`]s.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub total: usize,
    pub matched: usize,
    pub approximate: usize,
    pub unmatched: usize,
    pub without_location: usize,
}

impl EnrichStats {
    pub fn record(&mut self, outcome: EventOutcome) {
        self.total += 1;
        match outcome {
            EventOutcome::NoLocation => self.without_location += 1,
            EventOutcome::Matched => self.matched += 1,
            EventOutcome::Approximate => self.approximate += 1,
            EventOutcome::Unmatched => self.unmatched += 1,
        }
    }
}

/// Look up an event's location and, on a hit, replace its `LOCATION` with the
/// classroom address and its `DESCRIPTION` with the classroom details.
pub fn enrich_event(event: &mut Component, table: &ReferenceTable) -> EventOutcome {
    let Some(location) = event.get(LOCATION).filter(|l| !l.is_empty()) else {
        return EventOutcome::NoLocation;
    };

    let (row, display, outcome) = if let Some(row) = table.lookup(&location, LookupMode::Exact) {
        (row, row.code.clone(), EventOutcome::Matched)
    } else if let Some(row) = table.lookup(&location, LookupMode::Partial) {
        (
            row,
            format!("*({location}){}", row.code),
            EventOutcome::Approximate,
        )
    } else {
        return EventOutcome::Unmatched;
    };

    event.set(LOCATION, &row.address);
    event.set(DESCRIPTION, &format_description(&display, row));
    outcome
}

/// `"<display> - <details>\nDepartment: <department>"`
pub fn format_description(display: &str, row: &ReferenceRow) -> String {
    format!(
        "{display} - {}\nDepartment: {}",
        row.details, row.department
    )
}

/// `floor(100 * processed / total)`, with an empty document counting as done.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100 / total) as u8
}
