//! Domain Ports - Core trait definitions for the dashboard gateway
//!
//! These traits define the boundaries between the REST layer and the
//! external systems it fronts: the cluster orchestrator and the OSD
//! metadata feed. Adapters in `controlplane::backends` implement them.

use crate::domain::drive_group::DriveGroupSpec;
use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Orchestrator Status
// =============================================================================

/// Status summary reported by an orchestrator backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the backend can serve requests
    pub available: bool,
    /// Human readable description (backend name or reason it is unavailable)
    #[serde(default)]
    pub description: String,
}

impl OrchestratorStatus {
    pub fn available(description: impl Into<String>) -> Self {
        Self {
            available: true,
            description: description.into(),
        }
    }

    pub fn unavailable(description: impl Into<String>) -> Self {
        Self {
            available: false,
            description: description.into(),
        }
    }
}

// =============================================================================
// Device Lights
// =============================================================================

/// Which indicator light of a device to toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceLightKind {
    /// Identification light
    Ident,
}

impl std::fmt::Display for DeviceLightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceLightKind::Ident => write!(f, "ident"),
        }
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// A storage device reported in a host inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDevice {
    /// Device path as reported by the orchestrator (e.g. `vdc`, `nvme0n1`)
    pub path: String,
    /// Stable device identifier (vendor/model/serial), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Whether the device can be used for a new OSD
    #[serde(default)]
    pub available: bool,
    /// Reasons the device was rejected for OSD use
    #[serde(default)]
    pub rejected_reasons: Vec<String>,
    /// Raw system attributes (size, rotational, model, vendor, ...)
    #[serde(default)]
    pub sys_api: BTreeMap<String, serde_json::Value>,
    /// OSDs that claim this device; filled in by the ownership merge
    #[serde(default)]
    pub osd_ids: Vec<u32>,
}

impl InventoryDevice {
    /// Create a device entry with only a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device_id: None,
            available: true,
            rejected_reasons: Vec::new(),
            sys_api: BTreeMap::new(),
            osd_ids: Vec::new(),
        }
    }
}

/// Per-host inventory report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryNode {
    /// Hostname
    pub name: String,
    /// Address the orchestrator reaches the host on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    /// Devices on the host
    #[serde(default)]
    pub devices: Vec<InventoryDevice>,
}

// =============================================================================
// Services
// =============================================================================

/// A daemon/service instance managed by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    /// Host the daemon runs on
    pub hostname: String,
    /// Service type (mon, mgr, osd, mds, rgw, ...)
    pub service_type: String,
    /// Service instance id (e.g. `a` for `mon.a`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Numeric status: 1 running, 0 stopped, -1 error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<chrono::DateTime<chrono::Utc>>,
}

// =============================================================================
// OSD Metadata
// =============================================================================

/// Metadata record published by a single OSD
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsdMetadataRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Comma separated device names, e.g. `sda,sdb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<String>,
}

impl OsdMetadataRecord {
    pub fn new(hostname: impl Into<String>, devices: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            devices: Some(devices.into()),
        }
    }
}

/// OSD id (string form) to metadata record, in feed order
pub type OsdMetadataFeed = IndexMap<String, OsdMetadataRecord>;

// =============================================================================
// Orchestrator Client Port
// =============================================================================

/// Port for the external cluster orchestrator
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Backend name
    fn backend_name(&self) -> &str;

    /// Report backend status
    async fn status(&self) -> Result<OrchestratorStatus>;

    /// Whether the backend is configured and reachable
    async fn available(&self) -> bool;

    /// Switch a device indicator light on or off
    async fn blink_device_light(
        &self,
        hostname: &str,
        device: &str,
        kind: DeviceLightKind,
        on: bool,
    ) -> Result<()>;

    /// List host inventories, optionally restricted to the given hosts
    async fn list_inventory(&self, hosts: Option<&[String]>) -> Result<Vec<InventoryNode>>;

    /// List services, each filter optional
    async fn list_services(
        &self,
        service_type: Option<&str>,
        service_id: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Vec<ServiceDescription>>;

    /// Create OSDs described by a drive group
    async fn create_osds(&self, spec: &DriveGroupSpec) -> Result<()>;
}

// =============================================================================
// OSD Metadata Port
// =============================================================================

/// Port for the per-OSD metadata feed
#[async_trait]
pub trait OsdMetadataSource: Send + Sync {
    /// Fetch the current metadata of every OSD
    async fn osd_metadata(&self) -> Result<OsdMetadataFeed>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type OrchestratorClientRef = Arc<dyn OrchestratorClient>;
pub type OsdMetadataSourceRef = Arc<dyn OsdMetadataSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_kind_display() {
        assert_eq!(format!("{}", DeviceLightKind::Ident), "ident");
        assert_eq!(
            serde_json::to_value(DeviceLightKind::Ident).unwrap(),
            serde_json::json!("ident")
        );
    }

    #[test]
    fn test_osd_metadata_feed_keeps_order_and_optional_fields() {
        let feed: OsdMetadataFeed = serde_json::from_str(
            r#"{"2": {"hostname": "node2"}, "0": {"devices": "vdc", "arch": "x86_64"}}"#,
        )
        .unwrap();

        let keys: Vec<_> = feed.keys().cloned().collect();
        assert_eq!(keys, vec!["2", "0"]);
        assert_eq!(feed["2"].devices, None);
        assert_eq!(feed["0"].hostname, None);
        assert_eq!(feed["0"].devices.as_deref(), Some("vdc"));
    }

    #[test]
    fn test_inventory_device_defaults_osd_ids() {
        let node: InventoryNode =
            serde_json::from_str(r#"{"name": "node1", "devices": [{"path": "vdb"}]}"#).unwrap();
        assert_eq!(node.devices[0].path, "vdb");
        assert!(node.devices[0].osd_ids.is_empty());
    }
}
