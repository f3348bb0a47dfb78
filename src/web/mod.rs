//! Web API module for the classcal application.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod status;
pub mod tasks;

pub use routes::*;
