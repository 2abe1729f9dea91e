//! Worker node abstraction.
//!
//! # Responsibilities
//! - Represent a single configured worker node
//! - Normalise configured addresses into base URLs
//! - Build per-operation URLs for forwarding and probing

use std::fmt;
use thiserror::Error;
use url::Url;

use crate::config::NodeConfig;

/// Health classification produced by one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeHealth {
    /// Not yet probed. Excluded from selection.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl NodeHealth {
    pub fn is_healthy(self) -> bool {
        self == NodeHealth::Healthy
    }
}

impl fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeHealth::Unknown => "unknown",
            NodeHealth::Healthy => "healthy",
            NodeHealth::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Error returned for an unusable node address.
#[derive(Debug, Error)]
pub enum NodeAddressError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme '{0}', expected http")]
    Scheme(String),

    #[error("address has no host")]
    MissingHost,
}

/// Parse a configured address, accepting either a URI or a bare `host:port`.
pub fn parse_node_address(address: &str) -> Result<Url, NodeAddressError> {
    let trimmed = address.trim();
    let url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("http://{}", trimmed))?
    };

    match url.scheme() {
        "http" => {}
        other => return Err(NodeAddressError::Scheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(NodeAddressError::MissingHost);
    }
    Ok(url)
}

/// A single configured worker node. Immutable after configuration load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Position in the configured pool, used to keep snapshots in configured order.
    pub index: usize,
    /// Human-readable identifier.
    pub id: String,
    /// Base URL of the node.
    pub base_url: Url,
}

impl Node {
    pub fn new(index: usize, id: impl Into<String>, base_url: Url) -> Self {
        Self {
            index,
            id: id.into(),
            base_url,
        }
    }

    pub fn from_config(index: usize, config: &NodeConfig) -> Result<Self, NodeAddressError> {
        let base_url = parse_node_address(&config.address)?;
        Ok(Self::new(index, config.id.clone(), base_url))
    }

    /// URL for `path` on this node, e.g. `/reencrypt`.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Base URL without the trailing slash `Url` always adds.
    pub fn address(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_port_is_http() {
        let url = parse_node_address("127.0.0.1:8003").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8003/");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            parse_node_address("ftp://example.com"),
            Err(NodeAddressError::Scheme(s)) if s == "ftp"
        ));
        assert!(parse_node_address("http://").is_err());
    }

    #[test]
    fn test_endpoint_joins_path() {
        let node = Node::from_config(0, &NodeConfig::new("a", "http://localhost:8003")).unwrap();
        assert_eq!(node.endpoint("/gen_rekey").unwrap().as_str(), "http://localhost:8003/gen_rekey");
        assert_eq!(node.address(), "http://localhost:8003");
        assert_eq!(node.to_string(), "a (http://localhost:8003)");
    }

    #[test]
    fn test_unknown_is_not_healthy() {
        assert!(!NodeHealth::Unknown.is_healthy());
        assert!(!NodeHealth::Unhealthy.is_healthy());
        assert!(NodeHealth::Healthy.is_healthy());
    }
}
