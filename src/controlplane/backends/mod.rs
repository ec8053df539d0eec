//! Orchestrator Backend Adapters
//!
//! Provides adapters for the orchestrator port:
//! - Remote: orchestrator reached over its REST API
//! - Memory: in-process orchestrator for standalone runs and tests
//! - None: placeholder when no orchestrator is configured

pub mod memory;
pub mod remote;

pub use memory::*;
pub use remote::*;

use crate::domain::drive_group::DriveGroupSpec;
use crate::domain::ports::{
    DeviceLightKind, InventoryNode, OrchestratorClient, OrchestratorClientRef,
    OrchestratorStatus, ServiceDescription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Which orchestrator backend to use
#[derive(Debug, Clone, Default)]
pub enum BackendConfig {
    /// No orchestrator configured
    #[default]
    None,
    /// In-memory demo cluster
    Memory,
    /// Remote orchestrator REST API
    Remote(RemoteOrchestratorConfig),
}

/// Factory for creating orchestrator adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Create the orchestrator adapter for a configuration
    pub fn create(config: BackendConfig) -> Result<OrchestratorClientRef> {
        match config {
            BackendConfig::None => Ok(Arc::new(NoOrchestrator)),
            BackendConfig::Memory => Ok(Arc::new(InMemoryOrchestrator::demo())),
            BackendConfig::Remote(remote) => Ok(Arc::new(RemoteOrchestrator::new(remote)?)),
        }
    }
}

// =============================================================================
// No Orchestrator
// =============================================================================

/// Stand-in used when no orchestrator backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOrchestrator;

#[async_trait]
impl OrchestratorClient for NoOrchestrator {
    fn backend_name(&self) -> &str {
        "none"
    }

    async fn status(&self) -> Result<OrchestratorStatus> {
        Ok(OrchestratorStatus::unavailable("No orchestrator configured"))
    }

    async fn available(&self) -> bool {
        false
    }

    async fn blink_device_light(
        &self,
        _hostname: &str,
        _device: &str,
        _kind: DeviceLightKind,
        _on: bool,
    ) -> Result<()> {
        Err(Error::OrchestratorUnavailable)
    }

    async fn list_inventory(&self, _hosts: Option<&[String]>) -> Result<Vec<InventoryNode>> {
        Err(Error::OrchestratorUnavailable)
    }

    async fn list_services(
        &self,
        _service_type: Option<&str>,
        _service_id: Option<&str>,
        _hostname: Option<&str>,
    ) -> Result<Vec<ServiceDescription>> {
        Err(Error::OrchestratorUnavailable)
    }

    async fn create_osds(&self, _spec: &DriveGroupSpec) -> Result<()> {
        Err(Error::OrchestratorUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_backends() {
        let none = BackendFactory::create(BackendConfig::None).unwrap();
        assert_eq!(none.backend_name(), "none");
        assert!(!none.available().await);
        assert!(!none.status().await.unwrap().available);

        let memory = BackendFactory::create(BackendConfig::Memory).unwrap();
        assert_eq!(memory.backend_name(), "memory");
        assert!(memory.available().await);
    }
}
