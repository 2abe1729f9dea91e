//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every configured node's liveness path
//! - Classify each node from its probe alone (no thresholds)
//! - Publish the resulting healthy set in one step

use axum::body::Body;
use axum::http::{header, Request};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::load_balancer::node::{Node, NodeHealth};
use crate::load_balancer::pool::{HealthTransition, NodePool};
use crate::observability::metrics;

pub struct HealthProber {
    pool: Arc<NodePool>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthProber {
    pub fn new(pool: Arc<NodePool>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            pool,
            config,
            client,
        }
    }

    /// Probe one node. Any failure classifies the node unhealthy.
    pub async fn probe_node(&self, node: &Node) -> NodeHealth {
        let uri = match node.endpoint(&self.config.path) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(node = %node.id, error = %e, "Failed to build health check URL");
                return NodeHealth::Unhealthy;
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(uri.as_str())
            .header(header::USER_AGENT, "rekey-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(node = %node.id, error = %e, "Failed to build health check request");
                return NodeHealth::Unhealthy;
            }
        };

        match time::timeout(self.config.timeout(), self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => NodeHealth::Healthy,
            Ok(Ok(response)) => {
                tracing::debug!(node = %node.id, status = %response.status(), "Health check failed: non-success status");
                NodeHealth::Unhealthy
            }
            Ok(Err(e)) => {
                tracing::debug!(node = %node.id, error = %e, "Health check failed: connection error");
                NodeHealth::Unhealthy
            }
            Err(_) => {
                tracing::debug!(node = %node.id, timeout_ms = self.config.timeout_ms, "Health check failed: timeout");
                NodeHealth::Unhealthy
            }
        }
    }

    /// Probe every node concurrently and return the healthy ones in configured order.
    pub async fn probe_cycle(&self) -> Vec<Arc<Node>> {
        let started = Instant::now();
        let nodes = self.pool.all_nodes();
        let results = join_all(nodes.iter().map(|node| self.probe_node(node))).await;
        metrics::record_probe_cycle(started.elapsed());

        nodes
            .iter()
            .zip(results)
            .filter(|(_, health)| health.is_healthy())
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Run one probing cycle and publish its result.
    pub async fn run_once(&self) -> Vec<HealthTransition> {
        let healthy = self.probe_cycle().await;
        self.pool.replace_healthy(healthy)
    }

    /// Probe on a fixed interval until shutdown. The first tick comes one
    /// interval after start; callers run `run_once` eagerly beforehand.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.config.interval_ms,
            timeout_ms = self.config.timeout_ms,
            path = %self.config.path,
            nodes = self.pool.all_nodes().len(),
            "Health prober starting"
        );

        let interval = self.config.interval();
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let healthy = self.probe_cycle().await;

            // A cycle that straddles shutdown is not published.
            if shutdown_requested(&mut shutdown) {
                tracing::info!("Health prober stopping, discarding in-flight cycle");
                break;
            }
            self.pool.replace_healthy(healthy);
        }
    }

    /// Spawn the probing loop on the runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}
