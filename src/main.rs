//! OpenStack Operator
//!
//! Runs the `OpenStackControlPlane` controller together with its health,
//! metrics and REST servers, or prints the CRD manifests with `crdgen`.

use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use openstack_operator::controlplane::{self, install_crds, Diagnostics};
use openstack_operator::crd::{self, ConditionType};
use openstack_operator::{
    ApiServer, ApiServerConfig, Context, ControllerConfig, Error, KubeControlPlaneStore,
    KubeSubsystemProbe, Metrics, ReadinessBoard, ReadinessPolicy, Reconciler, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// OpenStack Operator - control plane readiness aggregation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Resync interval in seconds
    #[arg(long, env = "RESYNC_INTERVAL", default_value = "30")]
    resync_interval_secs: u64,

    /// Upper bound for the error requeue backoff in seconds
    #[arg(long, env = "ERROR_REQUEUE", default_value = "60")]
    error_requeue_secs: u64,

    /// Reconcile when an owned sub-resource changes
    #[arg(long, env = "WATCH_SUBSYSTEMS")]
    watch_subsystems: bool,

    /// Gate readiness on the block storage service
    #[arg(long, env = "REQUIRE_BLOCK_STORAGE")]
    require_block_storage: bool,

    /// Apply the CRDs before starting the controller
    #[arg(long, env = "INSTALL_CRDS")]
    install_crds: bool,

    /// Field manager for status writes and CRD installation
    #[arg(long, env = "FIELD_MANAGER", default_value = "openstack-operator")]
    field_manager: String,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the operator (default)
    Run,
    /// Print the CRD manifests as YAML
    Crdgen,
}

impl Args {
    fn policy(&self) -> ReadinessPolicy {
        let policy = ReadinessPolicy::control_plane();
        if self.require_block_storage {
            policy.require(ConditionType::CinderReady)
        } else {
            policy
        }
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            field_manager: self.field_manager.clone(),
            watch_subsystems: self.watch_subsystems,
            policy: self.policy(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let scheme = crd::scheme();

    if args.command == Some(Command::Crdgen) {
        print!("{}", scheme.to_yaml()?);
        return Ok(());
    }

    init_logging(&args)?;

    let config = args.controller_config();
    info!("Starting OpenStack Operator");
    info!("  Version: {}", openstack_operator::VERSION);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all"));
    info!("  REST API: {}", args.api_addr);
    info!("  Watch sub-systems: {}", config.watch_subsystems);
    for (condition_type, reason) in config.policy.deferred() {
        info!("  Deferred: {} ({})", condition_type, reason);
    }

    let client = kube::Client::try_default().await?;

    if args.install_crds {
        install_crds(client.clone(), &scheme, &config.field_manager).await?;
    }

    let board = ReadinessBoard::new();
    let metrics = Metrics::new()?;

    let reconciler = Reconciler::new(
        Arc::new(KubeControlPlaneStore::new(client.clone(), config.field_manager.clone())),
        Arc::new(KubeSubsystemProbe::new(client.clone())),
        config.policy.clone(),
        board.clone(),
        metrics.clone(),
    );
    let ctx = Context::new(reconciler, config.clone());

    // Start health server
    let health_addr = parse_addr(&args.health_addr, "health server")?;
    let diagnostics = ctx.diagnostics();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr, diagnostics).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics server")?;
    let exported = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, exported).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Start REST API
    let api_config = ApiServerConfig {
        rest_addr: parse_addr(&args.api_addr, "REST API")?,
    };
    let api_server = Arc::new(ApiServer::new(api_config, board, config.policy.clone()));
    let api_handle = {
        let api_server = api_server.clone();
        tokio::spawn(async move { api_server.run().await })
    };

    controlplane::run(client, ctx).await;

    api_server.shutdown();
    match api_handle.await {
        Ok(Err(e)) => error!("REST server error: {}", e),
        Err(e) => error!("REST server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Operator shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str, what: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {}: {}", what, addr, e)))
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
    for directive in ["hyper=warn", "kube=info", "tower=warn", "axum=info"] {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| Error::Configuration(format!("Invalid log directive: {}", e)))?,
        );
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

async fn run_health_server(addr: SocketAddr, diagnostics: Arc<RwLock<Diagnostics>>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let diagnostics = diagnostics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let diagnostics = diagnostics.clone();
                async move {
                    let (status, body) = match req.uri().path() {
                        "/healthz" | "/livez" | "/readyz" => (StatusCode::OK, Body::from("ok")),
                        "/diagnostics" => {
                            let snapshot = diagnostics.read().clone();
                            match serde_json::to_vec(&snapshot) {
                                Ok(json) => (StatusCode::OK, Body::from(json)),
                                Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Body::from(e.to_string())),
                            }
                        }
                        _ => (StatusCode::NOT_FOUND, Body::from("not found")),
                    };
                    let mut response = Response::new(body);
                    *response.status_mut() = status;
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

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

async fn run_metrics_server(addr: SocketAddr, metrics: Metrics) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                let mut response = Response::new(Body::from(e.to_string()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        },
                        _ => {
                            let mut response = Response::new(Body::from("not found"));
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
