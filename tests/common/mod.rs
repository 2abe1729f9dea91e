//! Shared utilities for integration testing.
//!
//! Mock worker nodes speak the same HTTP contract as real ones: `GET /health`,
//! `POST /gen_rekey` and `POST /reencrypt`. Each node keeps its own
//! delegation store, so a delegation issued by one node is unknown to the rest.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use rekey_balancer::config::{BalancerConfig, NodeConfig};
use rekey_balancer::lifecycle::Shutdown;
use rekey_balancer::load_balancer::NodePool;
use rekey_balancer::HttpServer;

#[derive(Default)]
struct NodeState {
    id: String,
    alive: AtomicBool,
    slow: AtomicBool,
    hits: AtomicUsize,
    issued: AtomicUsize,
    delegations: DashSet<String>,
    last_request_id: Mutex<Option<String>>,
}

/// Handle on a running mock worker node.
#[derive(Clone)]
pub struct MockNode {
    pub addr: SocketAddr,
    state: Arc<NodeState>,
}

impl MockNode {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn config(&self) -> NodeConfig {
        NodeConfig::new(self.id(), self.addr.to_string())
    }

    /// Make the node fail its health checks and operations.
    pub fn kill(&self) {
        self.state.alive.store(false, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.state.alive.store(true, Ordering::SeqCst);
    }

    /// Delay operations (not health checks) by two seconds.
    pub fn set_slow(&self, slow: bool) {
        self.state.slow.store(slow, Ordering::SeqCst);
    }

    /// Number of operations this node has received.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_request_id(&self) -> Option<String> {
        self.state.last_request_id.lock().unwrap().clone()
    }
}

/// Start a mock worker node on an ephemeral port.
pub async fn start_node(id: &str) -> MockNode {
    let state = Arc::new(NodeState {
        id: id.to_string(),
        alive: AtomicBool::new(true),
        ..Default::default()
    });

    let app = Router::new()
        .route("/health", get(node_health))
        .route("/gen_rekey", post(node_gen_rekey))
        .route("/reencrypt", post(node_reencrypt))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockNode { addr, state }
}

/// Start several nodes named `node-0`, `node-1`, ...
pub async fn start_nodes(count: usize) -> Vec<MockNode> {
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        nodes.push(start_node(&format!("node-{}", i)).await);
    }
    nodes
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"detail": "node down"})),
    )
        .into_response()
}

async fn node_health(State(state): State<Arc<NodeState>>) -> Response {
    if state.alive.load(Ordering::SeqCst) {
        Json(serde_json::json!({"status": "ok", "service": state.id})).into_response()
    } else {
        unavailable()
    }
}

async fn enter(state: &NodeState, headers: &HeaderMap) -> bool {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_request_id.lock().unwrap() = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if state.slow.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    state.alive.load(Ordering::SeqCst)
}

async fn node_gen_rekey(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !enter(&state, &headers).await {
        return unavailable();
    }
    let n = state.issued.fetch_add(1, Ordering::SeqCst);
    let rekey_id = format!("rk_{}_{}", state.id, n);
    state.delegations.insert(rekey_id.clone());
    Json(serde_json::json!({
        "rekey_id": rekey_id,
        "rk_blob": format!("{}->{}", body["from_user"], body["to_user"]),
    }))
    .into_response()
}

async fn node_reencrypt(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !enter(&state, &headers).await {
        return unavailable();
    }
    let rekey_id = body["rekey_id"].as_str().unwrap_or_default();
    if !state.delegations.contains(rekey_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "Invalid Re-Key ID"})),
        )
            .into_response();
    }
    Json(serde_json::json!({
        "cipher_re": format!("re[{}]:{}", state.id, body["cipher_blob"].as_str().unwrap_or_default()),
    }))
    .into_response()
}

/// Mock audit ledger collecting every `POST /tx` body.
#[derive(Clone)]
pub struct MockLedger {
    pub addr: SocketAddr,
    records: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockLedger {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().unwrap().clone()
    }
}

pub async fn start_ledger() -> MockLedger {
    let records = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/tx",
            post(
                |State(records): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                 Json(body): Json<serde_json::Value>| async move {
                    records.lock().unwrap().push(body);
                    Json(serde_json::json!({"status": "recorded"}))
                },
            ),
        )
        .with_state(records.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockLedger { addr, records }
}

/// Reserve a port with nothing listening on it.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Config for a pool of nodes. Probing is effectively disabled after the
/// eager startup cycle; tests that need periodic probing lower the interval.
pub fn config_for(nodes: &[NodeConfig]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.nodes = nodes.to_vec();
    config.health_check.interval_ms = 60_000;
    config.health_check.timeout_ms = 200;
    config.forwarding.timeout_ms = 1_000;
    config
}

/// A balancer running on an ephemeral port.
pub struct RunningBalancer {
    pub addr: SocketAddr,
    pub pool: Arc<NodePool>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl RunningBalancer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("balancer did not stop")
            .unwrap()
            .unwrap();
    }
}

pub async fn start_balancer(config: BalancerConfig) -> RunningBalancer {
    let server = HttpServer::new(config).unwrap();
    let pool = server.pool().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });

    // Wait until the eager probe cycle has been published.
    for _ in 0..100 {
        if pool.snapshot().cycle >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    RunningBalancer {
        addr,
        pool,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Name of the node that issued `rekey_id` (`rk_<node>_<n>`).
pub fn issuer(rekey_id: &str) -> String {
    let trimmed = rekey_id.trim_start_matches("rk_");
    trimmed
        .rsplit_once('_')
        .map(|(node, _)| node.to_string())
        .unwrap_or_default()
}
