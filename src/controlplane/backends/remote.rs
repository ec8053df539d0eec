//! Remote Orchestrator Adapter
//!
//! Talks to an orchestrator exposing a JSON REST API, and fetches the OSD
//! metadata feed over HTTP.
//!
//! | Operation            | Request                                 |
//! |----------------------|-----------------------------------------|
//! | status               | `GET  {base}/status`                    |
//! | blink_device_light   | `POST {base}/device_light`              |
//! | list_inventory       | `GET  {base}/inventory?hosts=a,b`       |
//! | list_services        | `GET  {base}/services?hostname=...`     |
//! | create_osds          | `POST {base}/osds`                      |

use crate::domain::drive_group::DriveGroupSpec;
use crate::domain::ports::{
    DeviceLightKind, InventoryNode, OrchestratorClient, OrchestratorStatus, OsdMetadataFeed,
    OsdMetadataSource, ServiceDescription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the remote orchestrator adapter
#[derive(Debug, Clone)]
pub struct RemoteOrchestratorConfig {
    /// Base URL of the orchestrator API
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RemoteOrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765/api/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeviceLightRequest<'a> {
    hostname: &'a str,
    device: &'a str,
    kind: DeviceLightKind,
    on: bool,
}

// =============================================================================
// Remote Orchestrator
// =============================================================================

/// Orchestrator reached over HTTP
pub struct RemoteOrchestrator {
    config: RemoteOrchestratorConfig,
    client: Client,
}

impl RemoteOrchestrator {
    pub fn new(config: RemoteOrchestratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::remote(format!("{}: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "{} returned {}: {}",
                operation,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let response = self.send(operation, self.request(Method::GET, path)).await?;
        response
            .json()
            .await
            .map_err(|e| Error::remote(format!("{}: invalid response: {}", operation, e)))
    }
}

/// Append `key=value` query pairs, skipping absent values
fn with_query(path: &str, params: &[(&str, Option<&str>)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter_map(|(k, v)| v.map(|v| format!("{}={}", k, urlencoding::encode(v))))
        .collect();

    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query.join("&"))
    }
}

#[async_trait]
impl OrchestratorClient for RemoteOrchestrator {
    fn backend_name(&self) -> &str {
        "remote"
    }

    /// An unreachable or failing orchestrator is reported as unavailable
    async fn status(&self) -> Result<OrchestratorStatus> {
        match self.get_json::<OrchestratorStatus>("status", "status").await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!("Orchestrator at {} unreachable: {}", self.config.base_url, e);
                Ok(OrchestratorStatus::unavailable(e.to_string()))
            }
        }
    }

    async fn available(&self) -> bool {
        self.status().await.map_or(false, |status| status.available)
    }

    async fn blink_device_light(
        &self,
        hostname: &str,
        device: &str,
        kind: DeviceLightKind,
        on: bool,
    ) -> Result<()> {
        let body = DeviceLightRequest {
            hostname,
            device,
            kind,
            on,
        };
        debug!("POST device_light {:?}", body);
        self.send(
            "blink_device_light",
            self.request(Method::POST, "device_light").json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_inventory(&self, hosts: Option<&[String]>) -> Result<Vec<InventoryNode>> {
        let hosts = hosts.map(|h| h.join(","));
        let path = with_query("inventory", &[("hosts", hosts.as_deref())]);
        self.get_json("list_inventory", &path).await
    }

    async fn list_services(
        &self,
        service_type: Option<&str>,
        service_id: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Vec<ServiceDescription>> {
        let path = with_query(
            "services",
            &[
                ("service_type", service_type),
                ("service_id", service_id),
                ("hostname", hostname),
            ],
        );
        self.get_json("list_services", &path).await
    }

    async fn create_osds(&self, spec: &DriveGroupSpec) -> Result<()> {
        self.send("create_osds", self.request(Method::POST, "osds").json(spec))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Remote OSD Metadata
// =============================================================================

/// OSD metadata feed fetched from a URL on every call
pub struct RemoteOsdMetadata {
    url: String,
    client: Client,
}

impl RemoteOsdMetadata {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl OsdMetadataSource for RemoteOsdMetadata {
    async fn osd_metadata(&self) -> Result<OsdMetadataFeed> {
        let feed = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_building() {
        assert_eq!(with_query("services", &[("hostname", None)]), "services");
        assert_eq!(
            with_query("services", &[("service_type", Some("osd")), ("hostname", Some("node 1"))]),
            "services?service_type=osd&hostname=node%201"
        );
        assert_eq!(
            with_query("inventory", &[("hosts", Some("a,b"))]),
            "inventory?hosts=a%2Cb"
        );
    }

    #[test]
    fn test_url_joining() {
        let orch = RemoteOrchestrator::new(RemoteOrchestratorConfig {
            base_url: "http://orch:8765/api/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(orch.url("status"), "http://orch:8765/api/status");
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_is_unavailable() {
        let orch = RemoteOrchestrator::new(RemoteOrchestratorConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();

        assert!(!orch.available().await);
        let status = orch.status().await.unwrap();
        assert!(!status.available);
        assert!(status.description.contains("status"));

        let err = orch.list_inventory(None).await.unwrap_err();
        assert!(err.is_transient());
    }
}
