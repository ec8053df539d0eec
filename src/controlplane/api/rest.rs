//! REST API Handlers
//!
//! Implements the orchestrator endpoints of the dashboard: status, device
//! identification, inventory, services and OSD creation, plus the task
//! listing used to follow long-running operations.

use crate::controlplane::api::auth::{AuthenticatedUser, Permission, Scope};
use crate::controlplane::api::guard::{authenticate, require_orchestrator, track_requests};
use crate::controlplane::api::server::ApiContext;
use crate::controlplane::identify::{identify_device, IdentifyDevice, IDENTIFY_TASK};
use crate::domain::drive_group::{DriveGroupSpec, OSD_COMPONENT};
use crate::domain::ports::{InventoryNode, OrchestratorStatus, ServiceDescription};
use crate::error::{Error, Result};
use crate::inventory::{build_ownership_map, merge_into_inventory};
use crate::tasks::{Task, TaskMetadata, TaskOutcome, TaskSummary};
use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Optional host filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostFilter {
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Optional task name filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub name: Option<String>,
}

/// OSD creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOsdRequest {
    /// Drive group specification, validated server side
    pub drive_group: serde_json::Value,
}

/// Reply for a task still executing after the wait window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub name: String,
    pub metadata: TaskMetadata,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }

        (
            status,
            Json(ApiErrorResponse {
                code: self.code().to_string(),
                detail: self.to_string(),
                component: self.component().map(str::to_string),
            }),
        )
            .into_response()
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    context: Arc<ApiContext>,
    timeout: Option<Duration>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(context: Arc<ApiContext>) -> Self {
        Self {
            context,
            timeout: None,
        }
    }

    /// Abort requests running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = self.context;

        let api = Router::new()
            // Orchestrator endpoints
            .route("/api/orchestrator", get(orchestrator_status))
            .route("/api/orchestrator/identify_device", post(identify))
            .route("/api/orchestrator/inventory", get(list_inventory))
            .route("/api/orchestrator/service", get(list_services))
            .route("/api/orchestrator/osd", post(create_osd))
            // Task endpoints
            .route("/api/task", get(list_tasks))
            .layer(middleware::from_fn_with_state(state.clone(), authenticate));

        let mut router = Router::new()
            .merge(api)
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(middleware::from_fn_with_state(state.clone(), track_requests))
            .layer(TraceLayer::new_for_http());

        if let Some(timeout) = self.timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }

        router.with_state(state)
    }
}

type AppState = Arc<ApiContext>;

// =============================================================================
// Handlers
// =============================================================================

/// Orchestrator status
async fn orchestrator_status(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
) -> Result<Json<OrchestratorStatus>> {
    let status = state.orchestrator.status().await?;
    Ok(Json(status))
}

/// Blink a device light for the requested duration
async fn identify(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response> {
    user.authorize(Scope::Hosts, Permission::Update)?;
    require_orchestrator(state.orchestrator.as_ref(), &state.metrics).await?;
    let request: IdentifyDevice = json_body(&body)?;

    info!(
        "{} identifies {} on {} ({}s)",
        user.username, request.device, request.hostname, request.duration
    );

    let orchestrator = state.orchestrator.clone();
    let metadata = request.task_metadata();
    let task = state
        .tasks
        .run(IDENTIFY_TASK, metadata, move |task, cancel| async move {
            identify_device(orchestrator.as_ref(), task.as_ref(), &request, &cancel)
                .await
                .map(|()| serde_json::Value::Null)
                .map_err(|e| e.in_component(OSD_COMPONENT))
        });

    Ok(task_response(&task, state.task_wait).await)
}

/// Host inventories with OSD ownership per device
async fn list_inventory(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filter): Query<HostFilter>,
) -> Result<Json<Vec<InventoryNode>>> {
    user.authorize(Scope::Hosts, Permission::Read)?;
    require_orchestrator(state.orchestrator.as_ref(), &state.metrics).await?;

    let hosts = filter.hostname.map(|h| vec![h]);
    let (mut nodes, feed) = futures::try_join!(
        state.orchestrator.list_inventory(hosts.as_deref()),
        state.osd_metadata.osd_metadata(),
    )?;

    let ownership = build_ownership_map(&feed)?;
    merge_into_inventory(&mut nodes, &ownership);

    debug!("Listed inventory of {} host(s)", nodes.len());
    Ok(Json(nodes))
}

/// Services, optionally on one host
async fn list_services(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filter): Query<HostFilter>,
) -> Result<Json<Vec<ServiceDescription>>> {
    user.authorize(Scope::Hosts, Permission::Read)?;
    require_orchestrator(state.orchestrator.as_ref(), &state.metrics).await?;

    let services = state
        .orchestrator
        .list_services(None, None, filter.hostname.as_deref())
        .await?;
    Ok(Json(services))
}

/// Create OSDs from a drive group
async fn create_osd(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    user.authorize(Scope::Osd, Permission::Create)?;
    require_orchestrator(state.orchestrator.as_ref(), &state.metrics).await?;
    let request: CreateOsdRequest = json_body(&body)?;

    let spec = DriveGroupSpec::from_json(request.drive_group)?;
    info!("{} creates OSDs on {}", user.username, spec.host_pattern);

    state
        .orchestrator
        .create_osds(&spec)
        .await
        .map_err(|e| e.in_component(OSD_COMPONENT))?;

    Ok((StatusCode::CREATED, Json(serde_json::Value::Null)))
}

/// Executing and finished tasks
async fn list_tasks(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Query(filter): Query<TaskFilter>,
) -> Json<TaskSummary> {
    Json(state.tasks.list(filter.name.as_deref()))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.orchestrator.available().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "orchestrator unavailable")
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Decode a JSON request body. Handlers call this after their guards so a
/// malformed body never hides a 403 or 503.
fn json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        Error::validation(OSD_COMPONENT, format!("invalid request body: {}", e))
    })
}

/// Wait up to `wait` for a task: 201 with its result when it finished,
/// the mapped error when it failed, 202 while it is still running.
async fn task_response(task: &Task, wait: Duration) -> Response {
    match task.wait(wait).await {
        Some(TaskOutcome::Success(value)) => (StatusCode::CREATED, Json(value)).into_response(),
        Some(TaskOutcome::Failure(exception)) => {
            let status = StatusCode::from_u16(exception.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(ApiErrorResponse {
                    code: exception.code,
                    detail: exception.detail,
                    component: exception.component,
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::ACCEPTED,
            Json(TaskAccepted {
                name: task.name().to_string(),
                metadata: task.metadata().clone(),
            }),
        )
            .into_response(),
    }
}
