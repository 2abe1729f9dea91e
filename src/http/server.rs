//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Run the eager probe cycle before serving
//! - Own the prober task and stop it once shutdown is requested

use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::BalancerConfig;
use crate::dispatch::{
    Dispatcher, HealthResponse, ReEncryptRequest, ReKeyRequest, UpstreamStatus, UpstreamsResponse,
};
use crate::health::HealthProber;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::relay;
use crate::lifecycle::shutdown::{wait_for, Shutdown};
use crate::load_balancer::node::NodeAddressError;
use crate::load_balancer::NodePool;

/// Slack added to the forwarding timeout for the whole-request timeout layer.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub pool: Arc<NodePool>,
}

/// HTTP server for the balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    pool: Arc<NodePool>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BalancerConfig) -> Result<Self, NodeAddressError> {
        let pool = Arc::new(NodePool::new(&config.nodes)?);
        let dispatcher = Dispatcher::from_config(pool.clone(), &config);

        tracing::info!(
            nodes = pool.all_nodes().len(),
            delegation_affinity = config.routing.delegation_affinity,
            audit = config.audit.enabled,
            "Dispatcher configured"
        );

        let state = AppState {
            dispatcher,
            pool: pool.clone(),
        };
        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            pool,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BalancerConfig, state: AppState) -> Router {
        let request_timeout = config.forwarding.timeout() + REQUEST_TIMEOUT_MARGIN;

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/upstreams", get(upstreams_handler))
            .route("/gen_rekey", post(gen_rekey_handler))
            .route("/reencrypt", post(reencrypt_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// One probe cycle is published before the first request is served. The
    /// prober stops when shutdown is requested, while in-flight requests still drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;

        let prober = HealthProber::new(self.pool.clone(), self.config.health_check.clone());
        prober.run_once().await;
        let report = self.pool.health_report();
        tracing::info!(
            healthy = report.healthy,
            total = report.total,
            "Initial health check complete"
        );

        let prober_stop = Shutdown::new();
        let prober_handle = prober.spawn(prober_stop.subscribe());

        tracing::info!(address = %addr, "HTTP server starting");

        // The prober stops as soon as shutdown is requested, not once draining ends.
        let stop_prober = prober_stop.clone();
        let served = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                wait_for(shutdown).await;
                tracing::info!("Shutdown requested, stopping health prober");
                stop_prober.trigger();
            })
            .await;

        prober_stop.trigger();
        if let Err(e) = prober_handle.await {
            tracing::error!(error = %e, "Health prober task failed");
        }

        tracing::info!("HTTP server stopped");
        served
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// The node pool served by this server.
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.pool.health_report();
    let status = if report.total > 0 && report.healthy == report.total {
        "ok"
    } else if report.healthy > 0 {
        "degraded"
    } else {
        "unavailable"
    };
    Json(HealthResponse {
        status: status.to_string(),
        healthy_upstreams: report.healthy,
        total_upstreams: report.total,
    })
}

async fn upstreams_handler(State(state): State<AppState>) -> Json<UpstreamsResponse> {
    let snapshot = state.pool.snapshot();
    let upstreams = state
        .pool
        .all_nodes()
        .iter()
        .map(|node| UpstreamStatus {
            id: node.id.clone(),
            address: node.address(),
            healthy: snapshot
                .states
                .get(node.index)
                .map(|s| s.is_healthy())
                .unwrap_or(false),
        })
        .collect();
    Json(UpstreamsResponse {
        cycle: snapshot.cycle,
        upstreams,
    })
}

async fn gen_rekey_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReKeyRequest>,
) -> Response {
    match state
        .dispatcher
        .generate_delegation(&request, headers.request_id())
        .await
    {
        Ok(dispatched) => relay(dispatched.reply),
        Err(e) => e.into_response(),
    }
}

async fn reencrypt_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReEncryptRequest>,
) -> Response {
    match state
        .dispatcher
        .apply_delegated_transform(&request, headers.request_id())
        .await
    {
        Ok(dispatched) => relay(dispatched.reply),
        Err(e) => e.into_response(),
    }
}
