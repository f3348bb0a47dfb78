//! Classroom reference data: storage, scraping and periodic refresh.

pub mod parse;
pub mod refresher;
pub mod source;
pub mod store;

pub use refresher::{RefreshOutcome, Refresher, RetryPolicy};
pub use source::{FetchError, HttpSource, ReferenceSource};
pub use store::{LookupMode, ReferenceRow, ReferenceStore, ReferenceTable};
