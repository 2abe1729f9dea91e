//! Node registry.
//!
//! # Responsibilities
//! - Hold the fixed set of configured worker nodes
//! - Hold the last published health snapshot
//! - Select the next healthy node in round-robin order
//!
//! # Design Decisions
//! - The whole snapshot is swapped in one step (`ArcSwap`), so a reader never
//!   sees a healthy set that mixes two probing cycles
//! - Only the prober publishes; dispatchers read and advance the cursor
//! - The cursor is a lock-free atomic counter, not part of the snapshot

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::NodeConfig;
use crate::load_balancer::node::{Node, NodeAddressError, NodeHealth};
use crate::load_balancer::round_robin::RoundRobin;
use crate::observability::metrics;

/// Health of every configured node as published by one probing cycle.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    /// Number of cycles published so far; 0 before the first probe.
    pub cycle: u64,
    /// Per-node health, indexed like `NodePool::all_nodes`.
    pub states: Vec<NodeHealth>,
    /// Healthy nodes in configured order.
    pub healthy: Vec<Arc<Node>>,
}

impl HealthSnapshot {
    fn unprobed(node_count: usize) -> Self {
        Self {
            cycle: 0,
            states: vec![NodeHealth::Unknown; node_count],
            healthy: Vec::new(),
        }
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.healthy.iter().any(|n| n.index == node.index)
    }
}

/// A node chosen for one dispatch.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Global rotation index claimed for this dispatch.
    pub rotation: usize,
    pub node: Arc<Node>,
}

/// A change in one node's classification between two published cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub node: Arc<Node>,
    pub from: NodeHealth,
    pub to: NodeHealth,
}

/// Healthy and total node counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
}

/// The authoritative node pool shared by the prober and the dispatcher.
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Arc<Node>>,
    snapshot: ArcSwap<HealthSnapshot>,
    cursor: RoundRobin,
}

impl NodePool {
    /// Build a pool from configuration. Every node starts out unprobed.
    pub fn new(configs: &[NodeConfig]) -> Result<Self, NodeAddressError> {
        let nodes = configs
            .iter()
            .enumerate()
            .map(|(index, config)| Node::from_config(index, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_nodes(nodes))
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let nodes: Vec<Arc<Node>> = nodes
            .into_iter()
            .enumerate()
            .map(|(index, mut node)| {
                node.index = index;
                Arc::new(node)
            })
            .collect();
        let snapshot = ArcSwap::from_pointee(HealthSnapshot::unprobed(nodes.len()));
        Self {
            nodes,
            snapshot,
            cursor: RoundRobin::new(),
        }
    }

    /// The static configured set, in configured order.
    pub fn all_nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    /// Healthy nodes of the last published cycle, in configured order.
    pub fn snapshot_healthy(&self) -> Vec<Arc<Node>> {
        self.snapshot.load().healthy.clone()
    }

    /// Atomically publish a new healthy set. Configured nodes missing from
    /// `healthy` are classified unhealthy; unknown nodes are ignored.
    pub fn replace_healthy<I>(&self, healthy: I) -> Vec<HealthTransition>
    where
        I: IntoIterator<Item = Arc<Node>>,
    {
        let healthy_ids: HashSet<String> = healthy.into_iter().map(|n| n.id.clone()).collect();

        let states: Vec<NodeHealth> = self
            .nodes
            .iter()
            .map(|n| {
                if healthy_ids.contains(&n.id) {
                    NodeHealth::Healthy
                } else {
                    NodeHealth::Unhealthy
                }
            })
            .collect();
        let healthy_nodes: Vec<Arc<Node>> = self
            .nodes
            .iter()
            .filter(|n| healthy_ids.contains(&n.id))
            .cloned()
            .collect();
        let healthy_count = healthy_nodes.len();

        let previous = self.snapshot.rcu(|prev| HealthSnapshot {
            cycle: prev.cycle + 1,
            states: states.clone(),
            healthy: healthy_nodes.clone(),
        });

        let transitions: Vec<HealthTransition> = self
            .nodes
            .iter()
            .zip(states.iter())
            .filter_map(|(node, &to)| {
                let from = previous.states.get(node.index).copied().unwrap_or_default();
                (from != to).then(|| HealthTransition {
                    node: node.clone(),
                    from,
                    to,
                })
            })
            .collect();

        for t in &transitions {
            match t.to {
                NodeHealth::Healthy => {
                    tracing::info!(node = %t.node.id, from = %t.from, "Node is healthy");
                }
                _ => {
                    tracing::warn!(node = %t.node.id, from = %t.from, "Node is unhealthy, excluded from rotation");
                }
            }
        }

        for (node, state) in self.nodes.iter().zip(states.iter()) {
            metrics::record_node_health(&node.id, state.is_healthy());
        }
        metrics::record_healthy_nodes(healthy_count);

        tracing::debug!(
            cycle = previous.cycle + 1,
            healthy = healthy_count,
            total = self.nodes.len(),
            "Published health snapshot"
        );

        transitions
    }

    /// Select the next healthy node. Returns `None` without advancing the
    /// cursor when no node is healthy.
    pub fn select(&self) -> Option<Selection> {
        let snapshot = self.snapshot.load();
        self.cursor
            .next_node(&snapshot.healthy)
            .map(|(rotation, node)| Selection { rotation, node })
    }

    /// Return the node with `index` if it is in the current healthy set.
    pub fn healthy_node(&self, index: usize) -> Option<Arc<Node>> {
        self.snapshot
            .load()
            .healthy
            .iter()
            .find(|n| n.index == index)
            .cloned()
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            healthy: self.snapshot.load().healthy.len(),
            total: self.nodes.len(),
        }
    }
}
