//! Response construction.
//!
//! # Responsibilities
//! - Relay a node's successful reply unchanged (status, content type, body)
//! - Relay a node's rejection verbatim
//! - Map dispatcher failures to 502/503/400 with a JSON `detail`

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::dispatch::{DispatchError, UpstreamReply};

/// Error body, shaped like the worker nodes' own errors.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn raw(status: StatusCode, content_type: Option<header::HeaderValue>, body: axum::body::Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    if let Some(ct) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    response
}

/// Relay a node's reply as the client response.
pub fn relay(reply: UpstreamReply) -> Response {
    raw(reply.status, reply.content_type, reply.body)
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            DispatchError::UpstreamRejected {
                status,
                content_type,
                body,
                ..
            } => return raw(status, content_type, body),
            DispatchError::UpstreamUnreachable { .. }
            | DispatchError::UpstreamTimeout { .. }
            | DispatchError::UpstreamBody { .. } => "Proxy communication failed".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}
