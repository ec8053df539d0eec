//! Dashboard Metrics
//!
//! Prometheus metrics exported on the metrics server.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics of the REST layer and task tracker
#[derive(Clone)]
pub struct DashboardMetrics {
    registry: Registry,
    /// Requests by matched route and status code
    pub requests_total: IntCounterVec,
    /// Requests rejected because no orchestrator was available
    pub orchestrator_unavailable_total: IntCounter,
    /// Tasks currently executing
    pub tasks_running: IntGauge,
}

impl DashboardMetrics {
    /// Create and register all metrics in a dedicated registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "orchestrator_dashboard_requests_total",
                "REST requests by endpoint and status",
            ),
            &["endpoint", "status"],
        )
        .map_err(metrics_error)?;
        let orchestrator_unavailable_total = IntCounter::new(
            "orchestrator_dashboard_orchestrator_unavailable_total",
            "Requests rejected because the orchestrator was unavailable",
        )
        .map_err(metrics_error)?;
        let tasks_running = IntGauge::new(
            "orchestrator_dashboard_tasks_running",
            "Number of executing tasks",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(orchestrator_unavailable_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tasks_running.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests_total,
            orchestrator_unavailable_total,
            tasks_running,
        })
    }

    /// Record a finished request
    pub fn observe_request(&self, endpoint: &str, status: u16) {
        self.requests_total
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
    }

    /// Encode all metrics in the Prometheus text format.
    ///
    /// Returns the content type and the encoded body.
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
