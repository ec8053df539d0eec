//! In-Memory Orchestrator
//!
//! Orchestrator backend holding its inventory and services in memory. Used
//! for standalone runs and as the test double for the REST layer; it records
//! every light toggle and OSD creation it receives.

use crate::domain::drive_group::DriveGroupSpec;
use crate::domain::ports::{
    DeviceLightKind, InventoryDevice, InventoryNode, OrchestratorClient, OrchestratorStatus,
    OsdMetadataFeed, OsdMetadataRecord, OsdMetadataSource, ServiceDescription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

/// A recorded `blink_device_light` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightCall {
    pub hostname: String,
    pub device: String,
    pub kind: DeviceLightKind,
    pub on: bool,
}

impl LightCall {
    pub fn new(hostname: &str, device: &str, kind: DeviceLightKind, on: bool) -> Self {
        Self {
            hostname: hostname.to_string(),
            device: device.to_string(),
            kind,
            on,
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: Vec<InventoryNode>,
    services: Vec<ServiceDescription>,
    light_calls: Vec<LightCall>,
    created: Vec<DriveGroupSpec>,
}

/// Orchestrator backend backed by in-memory state
#[derive(Debug)]
pub struct InMemoryOrchestrator {
    state: RwLock<ClusterState>,
    available: AtomicBool,
    fail_lights: AtomicBool,
    /// Calls other than `available()`
    calls: AtomicUsize,
}

impl InMemoryOrchestrator {
    /// Create an empty, available orchestrator
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClusterState::default()),
            available: AtomicBool::new(true),
            fail_lights: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Orchestrator seeded with a small two-host cluster
    pub fn demo() -> Self {
        let orch = Self::new();
        orch.add_node(InventoryNode {
            name: "node1".into(),
            addr: Some("10.0.0.1".into()),
            devices: ["nvme0n1", "vdb", "vdc", "vdd"]
                .into_iter()
                .map(InventoryDevice::new)
                .collect(),
        });
        orch.add_node(InventoryNode {
            name: "node2".into(),
            addr: Some("10.0.0.2".into()),
            devices: ["vdb", "vdc"].into_iter().map(InventoryDevice::new).collect(),
        });
        for (host, service_type, service_id) in [
            ("node1", "mon", "a"),
            ("node1", "mgr", "x"),
            ("node1", "osd", "0"),
            ("node1", "osd", "1"),
            ("node2", "osd", "2"),
        ] {
            orch.add_service(ServiceDescription {
                hostname: host.into(),
                service_type: service_type.into(),
                service_id: Some(service_id.into()),
                container_id: None,
                version: None,
                status: Some(1),
                status_desc: Some("running".into()),
                last_refresh: Some(chrono::Utc::now()),
            });
        }
        orch
    }

    pub fn add_node(&self, node: InventoryNode) {
        self.state.write().nodes.push(node);
    }

    pub fn add_service(&self, service: ServiceDescription) {
        self.state.write().services.push(service);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every light toggle fail
    pub fn fail_lights(&self, fail: bool) {
        self.fail_lights.store(fail, Ordering::SeqCst);
    }

    pub fn light_calls(&self) -> Vec<LightCall> {
        self.state.read().light_calls.clone()
    }

    pub fn created_osds(&self) -> Vec<DriveGroupSpec> {
        self.state.read().created.clone()
    }

    /// Number of calls other than `available()`
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrchestratorClient for InMemoryOrchestrator {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn status(&self) -> Result<OrchestratorStatus> {
        self.record_call();
        if self.available.load(Ordering::SeqCst) {
            Ok(OrchestratorStatus::available("In-memory orchestrator"))
        } else {
            Ok(OrchestratorStatus::unavailable("In-memory orchestrator is offline"))
        }
    }

    async fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn blink_device_light(
        &self,
        hostname: &str,
        device: &str,
        kind: DeviceLightKind,
        on: bool,
    ) -> Result<()> {
        self.record_call();
        if self.fail_lights.load(Ordering::SeqCst) {
            return Err(Error::remote(format!(
                "cannot switch {} light of {} on {}",
                kind, device, hostname
            )));
        }

        debug!("Light {} {}:{} -> {}", kind, hostname, device, on);
        self.state
            .write()
            .light_calls
            .push(LightCall::new(hostname, device, kind, on));
        Ok(())
    }

    async fn list_inventory(&self, hosts: Option<&[String]>) -> Result<Vec<InventoryNode>> {
        self.record_call();
        let state = self.state.read();
        Ok(state
            .nodes
            .iter()
            .filter(|n| hosts.map_or(true, |h| h.contains(&n.name)))
            .cloned()
            .collect())
    }

    async fn list_services(
        &self,
        service_type: Option<&str>,
        service_id: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Vec<ServiceDescription>> {
        self.record_call();
        let state = self.state.read();
        Ok(state
            .services
            .iter()
            .filter(|s| service_type.map_or(true, |t| s.service_type == t))
            .filter(|s| service_id.map_or(true, |id| s.service_id.as_deref() == Some(id)))
            .filter(|s| hostname.map_or(true, |h| s.hostname == h))
            .cloned()
            .collect())
    }

    async fn create_osds(&self, spec: &DriveGroupSpec) -> Result<()> {
        self.record_call();
        let mut state = self.state.write();
        if !state.nodes.iter().any(|n| spec.matches_host(&n.name)) {
            return Err(Error::remote(format!(
                "no host matches host_pattern {:?}",
                spec.host_pattern
            )));
        }

        info!("Creating OSDs for host pattern {}", spec.host_pattern);
        state.created.push(spec.clone());
        Ok(())
    }
}

// =============================================================================
// Static OSD Metadata
// =============================================================================

/// OSD metadata feed served from memory
#[derive(Debug, Default)]
pub struct StaticOsdMetadata {
    feed: RwLock<OsdMetadataFeed>,
}

impl StaticOsdMetadata {
    pub fn new(feed: OsdMetadataFeed) -> Self {
        Self {
            feed: RwLock::new(feed),
        }
    }

    /// Feed matching the `demo()` orchestrator
    pub fn demo() -> Self {
        let feed = [
            ("0", OsdMetadataRecord::new("node1", "nvme0n1,vdc")),
            ("1", OsdMetadataRecord::new("node1", "nvme0n1,vdb")),
            ("2", OsdMetadataRecord::new("node2", "vdc")),
        ]
        .into_iter()
        .map(|(id, record)| (id.to_string(), record))
        .collect();
        Self::new(feed)
    }

    pub fn insert(&self, osd_id: &str, record: OsdMetadataRecord) {
        self.feed.write().insert(osd_id.to_string(), record);
    }
}

#[async_trait]
impl OsdMetadataSource for StaticOsdMetadata {
    async fn osd_metadata(&self) -> Result<OsdMetadataFeed> {
        Ok(self.feed.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn test_inventory_host_filter() {
        let orch = InMemoryOrchestrator::demo();

        let all = orch.list_inventory(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let hosts = vec!["node2".to_string()];
        let filtered = orch.list_inventory(Some(&hosts)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "node2");
    }

    #[tokio::test]
    async fn test_service_filters() {
        let orch = InMemoryOrchestrator::demo();

        assert_eq!(orch.list_services(None, None, None).await.unwrap().len(), 5);
        assert_eq!(orch.list_services(None, None, Some("node2")).await.unwrap().len(), 1);
        assert_eq!(orch.list_services(Some("osd"), None, None).await.unwrap().len(), 3);
        assert_eq!(
            orch.list_services(Some("osd"), Some("1"), Some("node1"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_create_osds_requires_matching_host() {
        let orch = InMemoryOrchestrator::demo();

        let spec = DriveGroupSpec::from_json(json!({
            "host_pattern": "node*",
            "data_devices": {"paths": ["vdd"]}
        }))
        .unwrap();
        orch.create_osds(&spec).await.unwrap();
        assert_eq!(orch.created_osds(), vec![spec]);

        let spec = DriveGroupSpec::from_json(json!({
            "host_pattern": "storage-*",
            "data_devices": {"all": true}
        }))
        .unwrap();
        let err = orch.create_osds(&spec).await.unwrap_err();
        assert_matches!(err, Error::OrchestratorRemote { .. });
    }

    #[tokio::test]
    async fn test_available_is_not_counted() {
        let orch = InMemoryOrchestrator::new();
        orch.set_available(false);
        assert!(!orch.available().await);
        assert_eq!(orch.call_count(), 0);

        let status = orch.status().await.unwrap();
        assert!(!status.available);
        assert_eq!(orch.call_count(), 1);
    }

    #[tokio::test]
    async fn test_static_metadata_insert() {
        let source = StaticOsdMetadata::default();
        source.insert("7", OsdMetadataRecord::new("node9", "sda"));
        let feed = source.osd_metadata().await.unwrap();
        assert_eq!(feed["7"].hostname.as_deref(), Some("node9"));
    }
}
