//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the re-key balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Worker node definitions. The pool is fixed for the process lifetime.
    pub nodes: Vec<NodeConfig>,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Forwarding settings.
    pub forwarding: ForwardingConfig,

    /// Delegation routing settings.
    pub routing: RoutingConfig,

    /// Audit side channel.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8002").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8002".to_string(),
        }
    }
}

/// Worker node configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Human-readable node identifier used in logs and metrics.
    pub id: String,

    /// Node address, either a URI ("http://127.0.0.1:8003") or "host:port".
    pub address: String,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Interval between probing cycles in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Liveness path probed on every node.
    pub path: String,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            timeout_ms: 2_000,
            path: "/health".to_string(),
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Upper bound on one forwarded round trip in milliseconds.
    pub timeout_ms: u64,
}

impl ForwardingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Delegation routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Pin `reencrypt` calls to the node that issued the delegation.
    /// When false, worker nodes are assumed to share one delegation store.
    pub delegation_affinity: bool,

    /// Most delegation ids pinned at once; the oldest is evicted beyond this.
    pub affinity_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            delegation_affinity: true,
            affinity_capacity: 100_000,
        }
    }
}

/// Audit ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit audit records for forwarded operations.
    pub enabled: bool,

    /// Base URL of the audit ledger.
    pub url: String,

    /// Timeout for one audit call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8006".to_string(),
            timeout_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes, for both client requests and node replies.
    pub max_body_size: usize,
    /// Reject empty identifiers and blobs before dispatch.
    pub strict_validation: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            strict_validation: true,
        }
    }
}

impl BalancerConfig {
    /// Configuration with the two local worker nodes the stack runs by default.
    pub fn with_default_nodes() -> Self {
        Self {
            nodes: vec![
                NodeConfig::new("node-1", "http://localhost:8003"),
                NodeConfig::new("node-2", "http://localhost:8004"),
            ],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [[nodes]]
            id = "a"
            address = "127.0.0.1:9001"
            "#,
        )
        .unwrap();

        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.health_check.interval(), Duration::from_secs(5));
        assert_eq!(config.health_check.timeout(), Duration::from_secs(2));
        assert_eq!(config.health_check.path, "/health");
        assert!(config.routing.delegation_affinity);
        assert_eq!(config.routing.affinity_capacity, 100_000);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_sections_override() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [health_check]
            interval_ms = 250
            timeout_ms = 100

            [forwarding]
            timeout_ms = 1500

            [routing]
            delegation_affinity = false
            affinity_capacity = 64
            "#,
        )
        .unwrap();

        assert!(config.nodes.is_empty());
        assert_eq!(config.health_check.interval_ms, 250);
        assert_eq!(config.forwarding.timeout(), Duration::from_millis(1500));
        assert!(!config.routing.delegation_affinity);
        assert_eq!(config.routing.affinity_capacity, 64);
    }
}
