//! Wire types shared with worker nodes and clients.

use serde::{Deserialize, Serialize};

/// The two operations a worker node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GenerateDelegation,
    ApplyDelegatedTransform,
}

impl Operation {
    /// Path of the operation on a worker node (and on the balancer itself).
    pub fn path(self) -> &'static str {
        match self {
            Operation::GenerateDelegation => "/gen_rekey",
            Operation::ApplyDelegatedTransform => "/reencrypt",
        }
    }

    /// Short name for logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Operation::GenerateDelegation => "gen_rekey",
            Operation::ApplyDelegatedTransform => "reencrypt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReKeyRequest {
    pub from_user: String,
    pub to_user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReKeyResponse {
    pub rekey_id: String,
    pub rk_blob: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReEncryptRequest {
    pub cipher_blob: String,
    pub rekey_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReEncryptResponse {
    pub cipher_re: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub healthy_upstreams: usize,
    pub total_upstreams: usize,
}

/// One entry of `GET /health/upstreams`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamStatus {
    pub id: String,
    pub address: String,
    pub healthy: bool,
}

/// Body of `GET /health/upstreams`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamsResponse {
    pub cycle: u64,
    pub upstreams: Vec<UpstreamStatus>,
}
