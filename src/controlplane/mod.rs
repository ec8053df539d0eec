//! Control Plane Module
//!
//! Everything between the REST API and the orchestrator: the API itself,
//! the orchestrator backends and the device identification routine.

pub mod api;
pub mod backends;
pub mod identify;

pub use api::*;
pub use backends::*;
pub use identify::*;
