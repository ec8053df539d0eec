//! API Module
//!
//! REST surface of the dashboard: routing, request guards, access control
//! and the server that hosts them.

pub mod auth;
pub mod guard;
pub mod rest;
pub mod server;

pub use auth::*;
pub use guard::*;
pub use rest::*;
pub use server::*;
