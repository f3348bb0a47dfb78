//! In-memory classroom reference table, swapped atomically on refresh.
//!
//! Readers take an `Arc` snapshot of the current table and keep using it for
//! as long as they need; a refresh installs a brand-new table without ever
//! mutating the one readers hold.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Partial lookups stop shrinking the query once it is this many characters long.
pub const MIN_PARTIAL_QUERY_LEN: usize = 5;

/// One parsed classroom record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRow {
    /// Classroom code, e.g. `NET.01.101`.
    pub code: String,
    /// Free-form room description, e.g. `Lecture Hall`.
    pub details: String,
    /// Department name with the address stripped off.
    pub department: String,
    /// Address starting at the first digit (postal code).
    pub address: String,
}

impl ReferenceRow {
    pub fn new(
        code: impl Into<String>,
        details: impl Into<String>,
        department: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            details: details.into(),
            department: department.into(),
            address: address.into(),
        }
    }
}

/// How far a lookup may go before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Only the full query string is tried.
    Exact,
    /// On a miss, retry with one trailing character removed until the query
    /// reaches [`MIN_PARTIAL_QUERY_LEN`] characters.
    Partial,
}

/// An immutable, ordered snapshot of the classroom table.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    rows: Vec<ReferenceRow>,
    loaded_at: Option<DateTime<Utc>>,
}

impl ReferenceTable {
    pub fn new(rows: Vec<ReferenceRow>) -> Self {
        Self {
            rows,
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// When this table was installed, `None` for the initial empty table.
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Find the first row whose code contains `name` (case-sensitive).
    ///
    /// In [`LookupMode::Partial`] a miss shortens the query by one trailing
    /// character and tries again, as long as the query is still longer than
    /// [`MIN_PARTIAL_QUERY_LEN`] characters.
    pub fn lookup(&self, name: &str, mode: LookupMode) -> Option<&ReferenceRow> {
        if self.rows.is_empty() {
            return None;
        }

        let mut query = name;
        loop {
            if let Some(row) = self.rows.iter().find(|row| row.code.contains(query)) {
                return Some(row);
            }
            if mode == LookupMode::Exact || query.chars().count() <= MIN_PARTIAL_QUERY_LEN {
                return None;
            }
            let (last_char_start, _) = query.char_indices().next_back()?;
            query = &query[..last_char_start];
        }
    }
}

/// Shared handle to the current [`ReferenceTable`]. Clone-cheap.
#[derive(Clone)]
pub struct ReferenceStore {
    tx: Arc<watch::Sender<Arc<ReferenceTable>>>,
}

impl Default for ReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceStore {
    /// Create a store holding an empty table.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(ReferenceTable::default()));
        Self { tx: Arc::new(tx) }
    }

    /// Install a complete new table, returning its row count.
    pub fn replace(&self, rows: Vec<ReferenceRow>) -> usize {
        let count = rows.len();
        self.tx.send_replace(Arc::new(ReferenceTable::new(rows)));
        count
    }

    /// The table as of now. Later replacements do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<ReferenceTable> {
        self.tx.borrow().clone()
    }

    /// Wait until a non-empty table is installed, for at most `timeout`.
    ///
    /// Returns `true` if a table is available.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|table| !table.is_empty())).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_row() -> ReferenceRow {
        ReferenceRow::new(
            "NET.01.101",
            "Lecture Hall",
            "Dept. of Cardiology",
            "1094 Budapest Tömő 25-29",
        )
    }

    fn table() -> ReferenceTable {
        ReferenceTable::new(vec![
            ReferenceRow::new("EOK.02.201", "Seminar Room", "Basic Medical Science Center", "1094 Budapest Tűzoltó 37-47"),
            net_row(),
            ReferenceRow::new("NET.01.102", "Lecture Hall II", "Dept. of Cardiology", "1094 Budapest Tömő 25-29"),
        ])
    }

    #[test]
    fn exact_lookup_matches_substring_of_code() {
        let table = table();
        assert_eq!(table.lookup("NET.01.101", LookupMode::Exact), Some(&net_row()));
        // Substring of the code, first row in order wins.
        assert_eq!(
            table.lookup("NET.01", LookupMode::Exact).map(|r| r.code.as_str()),
            Some("NET.01.101")
        );
    }

    #[test]
    fn exact_lookup_is_case_sensitive() {
        assert_eq!(table().lookup("net.01.101", LookupMode::Exact), None);
    }

    #[test]
    fn exact_lookup_does_not_shrink_query() {
        assert_eq!(table().lookup("NET.01.101 (Lecture)", LookupMode::Exact), None);
    }

    #[test]
    fn partial_lookup_shrinks_trailing_characters() {
        let table = table();
        let row = table.lookup("NET.01.101 (Lecture)", LookupMode::Partial);
        assert_eq!(row.map(|r| r.code.as_str()), Some("NET.01.101"));
    }

    #[test]
    fn partial_lookup_stops_at_minimum_length() {
        let table = ReferenceTable::new(vec![ReferenceRow::new("ABCD", "", "", "1")]);
        // "ABCDE" is the shortest query tried; "ABCD" would match but is never reached.
        assert_eq!(table.lookup("ABCDEFGHI", LookupMode::Partial), None);

        let table = ReferenceTable::new(vec![ReferenceRow::new("xABCDEx", "", "", "1")]);
        assert!(table.lookup("ABCDEFGHI", LookupMode::Partial).is_some());
    }

    #[test]
    fn partial_lookup_short_query_is_not_shrunk() {
        let table = ReferenceTable::new(vec![ReferenceRow::new("ABC", "", "", "1")]);
        assert_eq!(table.lookup("ABCDE", LookupMode::Partial), None);
    }

    #[test]
    fn empty_table_returns_none() {
        let table = ReferenceTable::default();
        assert_eq!(table.lookup("NET.01.101", LookupMode::Exact), None);
        assert_eq!(table.lookup("ABCDEFGHI", LookupMode::Partial), None);
    }

    #[test]
    fn partial_lookup_respects_char_boundaries() {
        let table = ReferenceTable::new(vec![ReferenceRow::new("Tömő-1", "", "", "1")]);
        let row = table.lookup("Tömő-1 épület", LookupMode::Partial);
        assert_eq!(row.map(|r| r.code.as_str()), Some("Tömő-1"));
    }

    #[test]
    fn snapshot_is_isolated_from_later_replace() {
        let store = ReferenceStore::new();
        assert!(store.snapshot().is_empty());
        assert!(store.snapshot().loaded_at().is_none());

        store.replace(vec![net_row()]);
        let before = store.snapshot();
        store.replace(Vec::new());

        assert_eq!(before.len(), 1);
        assert!(store.snapshot().is_empty());
        assert!(store.snapshot().loaded_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_loaded_times_out_on_empty_store() {
        let store = ReferenceStore::new();
        assert!(!store.wait_until_loaded(Duration::from_secs(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_loaded_sees_replacement() {
        let store = ReferenceStore::new();
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.replace(vec![net_row()]);
        });
        assert!(store.wait_until_loaded(Duration::from_secs(60)).await);
    }
}
