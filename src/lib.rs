//! Classroom-aware calendar enrichment service.
//!
//! Uploaded `.ics` calendars are queued as tasks, and a pool of workers
//! rewrites each event's location using a classroom reference table that is
//! scraped and refreshed in the background.

pub mod app;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod data;
pub mod enrich;
pub mod logging;
pub mod reference;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;
pub mod web;
