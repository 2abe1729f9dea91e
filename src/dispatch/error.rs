//! Request-facing error taxonomy.

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors a dispatch call can surface to its caller. None of them is retried
/// against another node.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The healthy set was empty at selection time.
    #[error("No healthy proxies available")]
    NoHealthyUpstream,

    /// The delegation is pinned to a node that is not currently healthy.
    #[error("Delegation origin node {node} is unavailable")]
    AffinityUnavailable { rekey_id: String, node: String },

    /// Transport failure reaching the selected node.
    #[error("Proxy communication failed: {node}: {reason}")]
    UpstreamUnreachable { node: String, reason: String },

    /// The selected node did not answer within the forwarding timeout.
    #[error("Proxy communication failed: {node} timed out after {after:?}")]
    UpstreamTimeout { node: String, after: Duration },

    /// The node answered but its body could not be read.
    #[error("Proxy communication failed: {node}: invalid response body: {reason}")]
    UpstreamBody { node: String, reason: String },

    /// The node answered with a non-success status; relayed verbatim.
    #[error("Node {node} rejected the request with status {status}")]
    UpstreamRejected {
        node: String,
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    /// The client request failed validation before dispatch.
    #[error("{0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoHealthyUpstream | DispatchError::AffinityUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DispatchError::UpstreamUnreachable { .. }
            | DispatchError::UpstreamTimeout { .. }
            | DispatchError::UpstreamBody { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::UpstreamRejected { status, .. } => *status,
            DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Node the error is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            DispatchError::AffinityUnavailable { node, .. }
            | DispatchError::UpstreamUnreachable { node, .. }
            | DispatchError::UpstreamTimeout { node, .. }
            | DispatchError::UpstreamBody { node, .. }
            | DispatchError::UpstreamRejected { node, .. } => Some(node),
            DispatchError::NoHealthyUpstream | DispatchError::InvalidRequest(_) => None,
        }
    }
}
