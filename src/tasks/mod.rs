//! Task Tracking
//!
//! Progress tracking for long-running operations started over the REST API.

pub mod manager;

pub use manager::*;
