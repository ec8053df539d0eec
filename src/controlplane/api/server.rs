//! Dashboard API Server
//!
//! Runs the REST server and owns the context shared by its handlers.

use crate::controlplane::api::auth::AccessControl;
use crate::domain::ports::{OrchestratorClientRef, OsdMetadataSourceRef};
use crate::error::{Error, Result};
use crate::metrics::DashboardMetrics;
use crate::tasks::{TaskManager, DEFAULT_FINISHED_HISTORY};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// How long a request waits for a task before answering 202
    pub task_wait: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            request_timeout_secs: 30,
            task_wait: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// API Context
// =============================================================================

/// Shared context for API handlers
pub struct ApiContext {
    /// Orchestrator backend
    pub orchestrator: OrchestratorClientRef,
    /// OSD metadata feed
    pub osd_metadata: OsdMetadataSourceRef,
    /// Long-running task registry
    pub tasks: TaskManager,
    /// Token to user resolution
    pub access: AccessControl,
    pub metrics: DashboardMetrics,
    /// How long a request waits for a task before answering 202
    pub task_wait: Duration,
}

impl ApiContext {
    /// Create a new API context
    pub fn new(
        orchestrator: OrchestratorClientRef,
        osd_metadata: OsdMetadataSourceRef,
        access: AccessControl,
        metrics: DashboardMetrics,
        task_wait: Duration,
    ) -> Arc<Self> {
        let tasks =
            TaskManager::with_running_gauge(DEFAULT_FINISHED_HISTORY, metrics.tasks_running.clone());
        Arc::new(Self {
            orchestrator,
            osd_metadata,
            tasks,
            access,
            metrics,
            task_wait,
        })
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server
pub struct ApiServer {
    config: ApiServerConfig,
    context: Arc<ApiContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, context: Arc<ApiContext>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            context,
            shutdown_tx,
        }
    }

    /// Run the API server until shutdown or Ctrl-C
    pub async fn run(&self) -> Result<()> {
        info!("Starting Dashboard API Server");
        info!("  REST API: {}", self.config.rest_addr);
        info!("  Orchestrator: {}", self.context.orchestrator.backend_name());

        let rest_handle = self.spawn_rest_server();

        tokio::select! {
            result = rest_handle => {
                match result {
                    Ok(Err(e)) => error!("REST server error: {}", e),
                    Err(e) => error!("REST server task failed: {:?}", e),
                    Ok(Ok(())) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                self.shutdown();
            }
        }

        self.context.tasks.shutdown();
        Ok(())
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.rest_addr;
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let context = self.context.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(addr, timeout, context, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run the REST API server
async fn run_rest_server(
    addr: SocketAddr,
    timeout: Duration,
    context: Arc<ApiContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = RestRouter::new(context).with_timeout(timeout).build();

    info!("REST API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        Error::Internal(format!("Failed to bind REST server: {}", e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}
