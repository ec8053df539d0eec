//! Domain layer - Core types and port definitions
//!
//! This module defines the traits (ports) that orchestrator and metadata
//! adapters implement, plus the drive group specification they exchange.

pub mod drive_group;
pub mod ports;

pub use drive_group::*;
pub use ports::*;
