//! Orchestrator Dashboard - REST Gateway
//!
//! Dashboard controller in front of a storage cluster orchestrator. It lists
//! host inventories (annotated with the OSDs that own each device) and
//! services, creates OSDs from drive groups and blinks device lights for
//! identification, tracking that operation as a task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         REST API (axum)                          │
//! │   auth ─▶ guard (orchestrator available?) ─▶ handlers ─▶ tasks   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │     Inventory ownership map      │     Device identification     │
//! │  (OSD metadata ─▶ host/device)   │   (light on, tick, light off) │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                      Ports (domain::ports)                       │
//! │      OrchestratorClient            OsdMetadataSource             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   Remote (HTTP)   │   In-memory (standalone)   │   None (503)    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: REST API, orchestrator backends and device identification
//! - [`inventory`]: Device to OSD ownership mapping
//! - [`tasks`]: Long-running task tracking
//! - [`domain`]: Core domain types and traits
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod tasks;

// Re-export commonly used types
pub use controlplane::{
    identify_device, AccessControl, ApiContext, ApiServer, ApiServerConfig, AuthConfig,
    AuthenticatedUser, BackendConfig, BackendFactory, IdentifyDevice, InMemoryOrchestrator,
    NoOrchestrator, RemoteOrchestrator, RemoteOrchestratorConfig, RemoteOsdMetadata, RestRouter,
    Role, StaticOsdMetadata,
};

pub use domain::drive_group::{DeviceSelection, DriveGroupSpec, ObjectStore};

pub use domain::ports::{
    DeviceLightKind, InventoryDevice, InventoryNode, OrchestratorClient, OrchestratorClientRef,
    OrchestratorStatus, OsdMetadataFeed, OsdMetadataRecord, OsdMetadataSource,
    OsdMetadataSourceRef, ServiceDescription,
};

pub use error::{Error, Result};

pub use inventory::{build_ownership_map, merge_into_inventory, OwnershipMap};

pub use metrics::DashboardMetrics;

pub use tasks::{ProgressSink, Task, TaskManager, TaskOutcome, TaskSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
