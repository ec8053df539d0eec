//! Request Guards
//!
//! Middleware and precondition checks composed in front of the handlers:
//! authentication, request accounting, and the orchestrator availability
//! check.

use crate::controlplane::api::server::ApiContext;
use crate::domain::ports::OrchestratorClient;
use crate::error::{Error, Result};
use crate::metrics::DashboardMetrics;
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Resolve the bearer token and attach an `AuthenticatedUser` to the request
pub async fn authenticate(
    State(context): State<Arc<ApiContext>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match context.access.authenticate(authorization) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Count requests by matched route and response status
pub async fn track_requests(
    State(context): State<Arc<ApiContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    context
        .metrics
        .observe_request(&endpoint, response.status().as_u16());
    response
}

/// Fail with `OrchestratorUnavailable` unless the backend is available.
///
/// Only `available()` is called on the orchestrator.
pub async fn require_orchestrator(
    orchestrator: &dyn OrchestratorClient,
    metrics: &DashboardMetrics,
) -> Result<()> {
    if orchestrator.available().await {
        return Ok(());
    }
    warn!(
        "Rejecting request: orchestrator backend {} unavailable",
        orchestrator.backend_name()
    );
    metrics.orchestrator_unavailable_total.inc();
    Err(Error::OrchestratorUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{InMemoryOrchestrator, NoOrchestrator};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_require_orchestrator() {
        let metrics = DashboardMetrics::new().unwrap();

        let orch = InMemoryOrchestrator::new();
        assert!(require_orchestrator(&orch, &metrics).await.is_ok());

        orch.set_available(false);
        assert_matches!(
            require_orchestrator(&orch, &metrics).await,
            Err(Error::OrchestratorUnavailable)
        );
        assert_matches!(
            require_orchestrator(&NoOrchestrator, &metrics).await,
            Err(Error::OrchestratorUnavailable)
        );
        assert_eq!(metrics.orchestrator_unavailable_total.get(), 2);
        assert_eq!(orch.call_count(), 0);
    }
}
