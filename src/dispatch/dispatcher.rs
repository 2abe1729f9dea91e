//! Request dispatcher.
//!
//! # Responsibilities
//! - Pick one healthy node per request (round robin, or the delegation's
//!   origin node when affinity is enabled)
//! - Forward the operation once, with a bounded timeout
//! - Classify the node's answer: success relayed, non-success rejected verbatim
//!
//! # Design Decisions
//! - No per-request failover: a failed forward is reported, not retried on
//!   another node; exclusion happens at the next probing cycle
//! - An empty healthy set fails immediately without touching the network
//! - Affinity-routed calls do not advance the rotation cursor

use axum::body::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{AuditRecord, AuditSink};
use crate::config::BalancerConfig;
use crate::dispatch::error::DispatchError;
use crate::dispatch::types::{Operation, ReEncryptRequest, ReKeyRequest, ReKeyResponse};
use crate::dispatch::upstream::{UpstreamClient, UpstreamReply};
use crate::load_balancer::{DelegationAffinity, Node, NodePool};
use crate::observability::metrics;

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Node that served the request.
    pub node: Arc<Node>,
    /// Rotation index claimed, `None` when routed by affinity.
    pub rotation: Option<usize>,
    /// The node's reply, to be relayed unchanged.
    pub reply: UpstreamReply,
}

/// Routes operations to worker nodes.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<NodePool>,
    upstream: UpstreamClient,
    affinity: Option<Arc<DelegationAffinity>>,
    audit: Option<AuditSink>,
    timeout: Duration,
    strict_validation: bool,
}

impl Dispatcher {
    pub fn new(pool: Arc<NodePool>, upstream: UpstreamClient, timeout: Duration) -> Self {
        Self {
            pool,
            upstream,
            affinity: None,
            audit: None,
            timeout,
            strict_validation: true,
        }
    }

    /// Build a dispatcher wired the way `config` describes.
    pub fn from_config(pool: Arc<NodePool>, config: &BalancerConfig) -> Self {
        let upstream = UpstreamClient::new(config.security.max_body_size);
        let mut dispatcher = Self::new(pool, upstream, config.forwarding.timeout())
            .with_strict_validation(config.security.strict_validation);
        if config.routing.delegation_affinity {
            dispatcher = dispatcher.with_affinity(Arc::new(DelegationAffinity::with_capacity(
                config.routing.affinity_capacity,
            )));
        }
        if let Some(sink) = AuditSink::from_config(&config.audit) {
            dispatcher = dispatcher.with_audit(sink);
        }
        dispatcher
    }

    pub fn with_affinity(mut self, affinity: Arc<DelegationAffinity>) -> Self {
        self.affinity = Some(affinity);
        self
    }

    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn affinity(&self) -> Option<&Arc<DelegationAffinity>> {
        self.affinity.as_ref()
    }

    /// Forward a generate-delegation request to the next healthy node.
    pub async fn generate_delegation(
        &self,
        request: &ReKeyRequest,
        request_id: Option<&str>,
    ) -> Result<Dispatched, DispatchError> {
        if self.strict_validation {
            require_non_empty("from_user", &request.from_user)?;
            require_non_empty("to_user", &request.to_user)?;
        }

        let operation = Operation::GenerateDelegation;
        let selection = self.pool.select().ok_or(DispatchError::NoHealthyUpstream);
        let selection = self.record_rejection(operation, selection)?;

        let body = encode(request)?;
        let dispatched = self
            .forward(operation, selection.node, Some(selection.rotation), body, request_id)
            .await?;

        match serde_json::from_slice::<ReKeyResponse>(&dispatched.reply.body) {
            Ok(issued) => {
                if let Some(affinity) = &self.affinity {
                    affinity.pin(issued.rekey_id.clone(), dispatched.node.index);
                    tracing::debug!(rekey_id = %issued.rekey_id, node = %dispatched.node.id, "Pinned delegation to origin node");
                }
                if let Some(audit) = &self.audit {
                    let _ = audit.record(
                        AuditRecord::new(&request.from_user, "GEN_REKEY", &issued.rekey_id)
                            .detail("to_user", &request.to_user)
                            .detail("node", &dispatched.node.id)
                            .detail("request_id", request_id.unwrap_or("unknown")),
                    );
                }
            }
            Err(e) => {
                tracing::warn!(node = %dispatched.node.id, error = %e, "Node returned an unrecognised gen_rekey body, relaying as-is");
            }
        }

        Ok(dispatched)
    }

    /// Forward an apply-delegated-transform request. With affinity enabled a
    /// known `rekey_id` goes to its origin node; otherwise round robin.
    pub async fn apply_delegated_transform(
        &self,
        request: &ReEncryptRequest,
        request_id: Option<&str>,
    ) -> Result<Dispatched, DispatchError> {
        if self.strict_validation {
            require_non_empty("cipher_blob", &request.cipher_blob)?;
            require_non_empty("rekey_id", &request.rekey_id)?;
        }

        let operation = Operation::ApplyDelegatedTransform;
        let route = self.route_transform(&request.rekey_id);
        let (node, rotation) = self.record_rejection(operation, route)?;

        let body = encode(request)?;
        let dispatched = self.forward(operation, node, rotation, body, request_id).await?;

        if let Some(audit) = &self.audit {
            let _ = audit.record(
                AuditRecord::new("proxy", "REENCRYPT", &request.rekey_id)
                    .detail("node", &dispatched.node.id)
                    .detail("request_id", request_id.unwrap_or("unknown")),
            );
        }

        Ok(dispatched)
    }

    fn route_transform(&self, rekey_id: &str) -> Result<(Arc<Node>, Option<usize>), DispatchError> {
        if let Some(origin) = self.affinity.as_ref().and_then(|a| a.origin(rekey_id)) {
            return match self.pool.healthy_node(origin) {
                Some(node) => Ok((node, None)),
                None => {
                    let node = self
                        .pool
                        .all_nodes()
                        .get(origin)
                        .map(|n| n.id.clone())
                        .unwrap_or_else(|| format!("#{}", origin));
                    Err(DispatchError::AffinityUnavailable {
                        rekey_id: rekey_id.to_string(),
                        node,
                    })
                }
            };
        }

        self.pool
            .select()
            .map(|s| (s.node, Some(s.rotation)))
            .ok_or(DispatchError::NoHealthyUpstream)
    }

    /// Log and count a request that failed before reaching any node.
    fn record_rejection<T>(
        &self,
        operation: Operation,
        result: Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        if let Err(e) = &result {
            tracing::warn!(operation = operation.name(), error = %e, "Dispatch rejected before forwarding");
            metrics::record_request(operation.name(), e.status().as_u16(), e.node().unwrap_or("none"), Instant::now());
        }
        result
    }

    async fn forward(
        &self,
        operation: Operation,
        node: Arc<Node>,
        rotation: Option<usize>,
        body: Bytes,
        request_id: Option<&str>,
    ) -> Result<Dispatched, DispatchError> {
        let start = Instant::now();
        tracing::debug!(
            operation = operation.name(),
            node = %node.id,
            rotation = ?rotation,
            request_id = request_id.unwrap_or("unknown"),
            "Forwarding request"
        );

        let result = self
            .upstream
            .post_json(&node, operation, body, request_id, self.timeout)
            .await;

        match result {
            Ok(reply) if reply.status.is_success() => {
                metrics::record_request(operation.name(), reply.status.as_u16(), &node.id, start);
                Ok(Dispatched { node, rotation, reply })
            }
            Ok(reply) => {
                tracing::info!(
                    operation = operation.name(),
                    node = %node.id,
                    status = %reply.status,
                    "Node rejected request"
                );
                metrics::record_request(operation.name(), reply.status.as_u16(), &node.id, start);
                Err(DispatchError::UpstreamRejected {
                    node: node.id.clone(),
                    status: reply.status,
                    content_type: reply.content_type,
                    body: reply.body,
                })
            }
            Err(e) => {
                tracing::error!(
                    operation = operation.name(),
                    node = %node.id,
                    request_id = request_id.unwrap_or("unknown"),
                    error = %e,
                    "Upstream error"
                );
                metrics::record_request(operation.name(), e.status().as_u16(), &node.id, start);
                Err(e)
            }
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), DispatchError> {
    if value.trim().is_empty() {
        return Err(DispatchError::InvalidRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes, DispatchError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| DispatchError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn dispatcher(k: usize) -> Dispatcher {
        let configs: Vec<NodeConfig> = (0..k)
            .map(|i| NodeConfig::new(format!("n{}", i), format!("127.0.0.1:{}", 1 + i)))
            .collect();
        let pool = Arc::new(NodePool::new(&configs).unwrap());
        Dispatcher::new(pool, UpstreamClient::new(1024), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_pool_fails_fast() {
        let d = dispatcher(0);
        let started = Instant::now();
        let err = d
            .apply_delegated_transform(
                &ReEncryptRequest { cipher_blob: "abc".into(), rekey_id: "rk_1".into() },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHealthyUpstream));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_unprobed_pool_has_no_capacity() {
        let d = dispatcher(2);
        let err = d
            .generate_delegation(&ReKeyRequest { from_user: "a".into(), to_user: "b".into() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHealthyUpstream));
        assert_eq!(d.pool().health_report().total, 2);
    }

    #[tokio::test]
    async fn test_strict_validation_rejects_empty_fields() {
        let d = dispatcher(1);
        let err = d
            .generate_delegation(&ReKeyRequest { from_user: " ".into(), to_user: "b".into() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(ref m) if m.contains("from_user")));

        let lenient = dispatcher(0).with_strict_validation(false);
        let err = lenient
            .generate_delegation(&ReKeyRequest { from_user: "".into(), to_user: "".into() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHealthyUpstream));
    }

    #[tokio::test]
    async fn test_pinned_delegation_on_unhealthy_origin() {
        let affinity = Arc::new(DelegationAffinity::new());
        let d = dispatcher(2).with_affinity(affinity.clone());
        let nodes = d.pool().all_nodes().to_vec();
        d.pool().replace_healthy(vec![nodes[1].clone()]);
        affinity.pin("rk_1", 0);

        let err = d
            .apply_delegated_transform(
                &ReEncryptRequest { cipher_blob: "abc".into(), rekey_id: "rk_1".into() },
                None,
            )
            .await
            .unwrap_err();
        match err {
            DispatchError::AffinityUnavailable { rekey_id, node } => {
                assert_eq!(rekey_id, "rk_1");
                assert_eq!(node, "n0");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_route_transform_prefers_origin() {
        let affinity = Arc::new(DelegationAffinity::new());
        let d = dispatcher(3).with_affinity(affinity.clone());
        d.pool().replace_healthy(d.pool().all_nodes().to_vec());
        affinity.pin("rk_2", 2);

        for _ in 0..3 {
            let (node, rotation) = d.route_transform("rk_2").unwrap();
            assert_eq!(node.index, 2);
            assert_eq!(rotation, None);
        }

        let (node, rotation) = d.route_transform("rk_unknown").unwrap();
        assert_eq!(node.index, 0);
        assert_eq!(rotation, Some(0));
    }

    #[test]
    fn test_evicted_pin_falls_back_to_rotation() {
        let affinity = Arc::new(DelegationAffinity::with_capacity(1));
        let d = dispatcher(3).with_affinity(affinity.clone());
        d.pool().replace_healthy(d.pool().all_nodes().to_vec());
        affinity.pin("rk_old", 2);
        affinity.pin("rk_new", 1);

        let (node, rotation) = d.route_transform("rk_new").unwrap();
        assert_eq!((node.index, rotation), (1, None));

        let (node, rotation) = d.route_transform("rk_old").unwrap();
        assert_eq!((node.index, rotation), (0, Some(0)));
    }
}
