//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate node identities and addresses (plain http only)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::node::parse_node_address;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("node #{index} has an empty id")]
    EmptyNodeId { index: usize },

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("node '{id}' has invalid address '{address}': {reason}")]
    InvalidNodeAddress {
        id: String,
        address: String,
        reason: String,
    },

    #[error("duplicate node address '{0}'")]
    DuplicateNodeAddress(String),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroCapacity { field: &'static str },

    #[error("health_check.timeout_ms ({timeout_ms}) must not exceed health_check.interval_ms ({interval_ms})")]
    ProbeTimeoutExceedsInterval { timeout_ms: u64, interval_ms: u64 },

    #[error("health_check.path must start with '/': '{0}'")]
    InvalidProbePath(String),

    #[error("{field} is not a valid socket address: '{value}'")]
    InvalidSocketAddress { field: &'static str, value: String },

    #[error("audit.url is not a valid URL: '{0}'")]
    InvalidAuditUrl(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut ids = HashSet::new();
    let mut addresses = HashSet::new();
    for (index, node) in config.nodes.iter().enumerate() {
        if node.id.trim().is_empty() {
            errors.push(ValidationError::EmptyNodeId { index });
        } else if !ids.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }

        match parse_node_address(&node.address) {
            Ok(url) => {
                if !addresses.insert(url.to_string()) {
                    errors.push(ValidationError::DuplicateNodeAddress(node.address.clone()));
                }
            }
            Err(e) => errors.push(ValidationError::InvalidNodeAddress {
                id: node.id.clone(),
                address: node.address.clone(),
                reason: e.to_string(),
            }),
        }
    }

    let hc = &config.health_check;
    if hc.interval_ms == 0 {
        errors.push(ValidationError::ZeroDuration { field: "health_check.interval_ms" });
    }
    if hc.timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration { field: "health_check.timeout_ms" });
    }
    if hc.interval_ms > 0 && hc.timeout_ms > hc.interval_ms {
        errors.push(ValidationError::ProbeTimeoutExceedsInterval {
            timeout_ms: hc.timeout_ms,
            interval_ms: hc.interval_ms,
        });
    }
    if !hc.path.starts_with('/') {
        errors.push(ValidationError::InvalidProbePath(hc.path.clone()));
    }

    if config.forwarding.timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration { field: "forwarding.timeout_ms" });
    }

    if config.routing.delegation_affinity && config.routing.affinity_capacity == 0 {
        errors.push(ValidationError::ZeroCapacity { field: "routing.affinity_capacity" });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSocketAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.audit.enabled {
        if Url::parse(&config.audit.url).is_err() {
            errors.push(ValidationError::InvalidAuditUrl(config.audit.url.clone()));
        }
        if config.audit.timeout_ms == 0 {
            errors.push(ValidationError::ZeroDuration { field: "audit.timeout_ms" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
