//! Inventory Module
//!
//! Shapes orchestrator inventory listings for the dashboard.

pub mod ownership;

pub use ownership::*;
