//! Forwarding client for worker nodes.
//!
//! # Responsibilities
//! - POST one operation body to one node
//! - Bound the whole round trip (connect, response, body) by a timeout
//! - Translate transport failures into dispatch errors
//!
//! Status classification is left to the caller; any response that arrives in
//! time is returned as an `UpstreamReply`.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use tokio::time;

use crate::dispatch::error::DispatchError;
use crate::dispatch::types::Operation;
use crate::http::request::X_REQUEST_ID;
use crate::load_balancer::Node;

const USER_AGENT: &str = concat!("rekey-balancer/", env!("CARGO_PKG_VERSION"));

/// A node's answer, buffered.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// HTTP client used to forward operations to worker nodes.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    max_body_size: usize,
}

impl UpstreamClient {
    pub fn new(max_body_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            max_body_size,
        }
    }

    /// Forward `body` as JSON to `operation` on `node`.
    pub async fn post_json(
        &self,
        node: &Node,
        operation: Operation,
        body: Bytes,
        request_id: Option<&str>,
        timeout: Duration,
    ) -> Result<UpstreamReply, DispatchError> {
        let url = node
            .endpoint(operation.path())
            .map_err(|e| DispatchError::UpstreamUnreachable {
                node: node.id.clone(),
                reason: e.to_string(),
            })?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT);
        if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            builder = builder.header(X_REQUEST_ID, id);
        }
        let request = builder
            .body(Body::from(body))
            .map_err(|e| DispatchError::UpstreamUnreachable {
                node: node.id.clone(),
                reason: e.to_string(),
            })?;

        let round_trip = async {
            let response = self.client.request(request).await.map_err(|e| {
                DispatchError::UpstreamUnreachable {
                    node: node.id.clone(),
                    reason: e.to_string(),
                }
            })?;

            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), self.max_body_size)
                .await
                .map_err(|e| DispatchError::UpstreamBody {
                    node: node.id.clone(),
                    reason: e.to_string(),
                })?;

            Ok(UpstreamReply {
                status: parts.status,
                content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                body,
            })
        };

        match time::timeout(timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::UpstreamTimeout {
                node: node.id.clone(),
                after: timeout,
            }),
        }
    }
}
