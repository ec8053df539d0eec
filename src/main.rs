//! Orchestrator Dashboard
//!
//! Dashboard gateway in front of a storage cluster orchestrator. Serves the
//! orchestrator REST API plus separate health and metrics endpoints.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orchestrator_dashboard::{
    AccessControl, ApiContext, ApiServer, ApiServerConfig, AuthConfig, BackendConfig,
    BackendFactory, DashboardMetrics, Error, OrchestratorClientRef, OsdMetadataSourceRef,
    RemoteOrchestratorConfig, RemoteOsdMetadata, Result, StaticOsdMetadata,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Orchestrator Dashboard - inventory, services, OSD creation and device identification
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Base URL of the orchestrator REST API
    #[arg(long, env = "ORCHESTRATOR_URL")]
    orchestrator_url: Option<String>,

    /// URL of the OSD metadata feed
    #[arg(long, env = "OSD_METADATA_URL")]
    osd_metadata_url: Option<String>,

    /// Run against an in-memory demo cluster
    #[arg(long, env = "STANDALONE")]
    standalone: bool,

    /// YAML file with users, tokens and roles
    #[arg(long, env = "AUTH_FILE")]
    auth_file: Option<PathBuf>,

    /// How long a request waits for a task before answering 202 (ms)
    #[arg(long, env = "TASK_WAIT_MS", default_value = "2000")]
    task_wait_ms: u64,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Orchestrator Dashboard");
    info!("  Version: {}", orchestrator_dashboard::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Standalone mode: {}", args.standalone);

    let request_timeout = Duration::from_secs(args.request_timeout_secs);
    let (orchestrator, osd_metadata) = build_backends(&args, request_timeout)?;
    info!("Orchestrator backend: {}", orchestrator.backend_name());

    let access = match &args.auth_file {
        Some(path) => AccessControl::new(AuthConfig::load(path)?)?,
        None => {
            warn!("No auth file configured, authentication is disabled");
            AccessControl::disabled()
        }
    };

    let metrics = DashboardMetrics::new()?;

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_orchestrator).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
        request_timeout_secs: args.request_timeout_secs,
        task_wait: Duration::from_millis(args.task_wait_ms),
    };

    let context = ApiContext::new(
        orchestrator,
        osd_metadata,
        access,
        metrics,
        api_config.task_wait,
    );
    let api_server = ApiServer::new(api_config, context);

    api_server.run().await?;

    info!("Dashboard shutdown complete");
    Ok(())
}

/// Select the orchestrator backend and OSD metadata source
fn build_backends(
    args: &Args,
    timeout: Duration,
) -> Result<(OrchestratorClientRef, OsdMetadataSourceRef)> {
    let backend = if args.standalone {
        BackendConfig::Memory
    } else if let Some(url) = &args.orchestrator_url {
        BackendConfig::Remote(RemoteOrchestratorConfig {
            base_url: url.clone(),
            timeout,
        })
    } else {
        warn!("No orchestrator configured, orchestrator endpoints answer 503");
        BackendConfig::None
    };
    let orchestrator = BackendFactory::create(backend)?;

    let osd_metadata: OsdMetadataSourceRef = match &args.osd_metadata_url {
        Some(url) => Arc::new(RemoteOsdMetadata::new(url.clone(), timeout)?),
        None if args.standalone => Arc::new(StaticOsdMetadata::demo()),
        None => {
            warn!("No OSD metadata feed configured, devices report no OSDs");
            Arc::new(StaticOsdMetadata::default())
        }
    };

    Ok((orchestrator, osd_metadata))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "tower=warn", "axum=info"] {
        filter = filter.add_directive(directive.parse().map_err(|e| {
            Error::Configuration(format!("Invalid log directive {}: {}", directive, e))
        })?);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Health Server
// =============================================================================

fn plain_response(
    status: hyper::StatusCode,
    body: impl Into<hyper::Body>,
) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, orchestrator: OrchestratorClientRef) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let orchestrator = orchestrator.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let orchestrator = orchestrator.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => plain_response(StatusCode::OK, "ok"),
                        "/readyz" => {
                            if orchestrator.available().await {
                                plain_response(StatusCode::OK, "ok")
                            } else {
                                plain_response(
                                    StatusCode::SERVICE_UNAVAILABLE,
                                    "orchestrator unavailable",
                                )
                            }
                        }
                        _ => plain_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: DashboardMetrics) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.render() {
                            Ok((content_type, buffer)) => {
                                let mut response = plain_response(StatusCode::OK, buffer);
                                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                plain_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                            }
                        },
                        _ => plain_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
