use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReKeyResponse {
    pub rekey_id: String,
    pub rk_blob: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReEncryptResponse {
    pub cipher_re: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub healthy_upstreams: usize,
    pub total_upstreams: usize,
}

/// Error returned by the balancer client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The balancer (or the node behind it) answered with a non-success status.
    #[error("balancer returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The success body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub struct BalancerClient {
    client: Client,
    balancer_url: String,
}

impl BalancerClient {
    pub fn new(balancer_url: &str) -> Self {
        Self {
            client: Client::new(),
            balancer_url: balancer_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask a worker node to issue a delegation from `from_user` to `to_user`.
    pub async fn gen_rekey(&self, from_user: &str, to_user: &str) -> Result<ReKeyResponse, ClientError> {
        let body = serde_json::json!({ "from_user": from_user, "to_user": to_user });
        self.post("/gen_rekey", &body).await
    }

    /// Apply a previously issued delegation to a ciphertext.
    pub async fn reencrypt(&self, cipher_blob: &str, rekey_id: &str) -> Result<ReEncryptResponse, ClientError> {
        let body = serde_json::json!({ "cipher_blob": cipher_blob, "rekey_id": rekey_id });
        self.post("/reencrypt", &body).await
    }

    /// Current pool capacity.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.client.get(format!("{}/health", self.balancer_url)).send().await?;
        decode(resp).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &serde_json::Value) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(format!("{}{}", self.balancer_url, path))
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        return Err(ClientError::Status { status, body: text });
    }

    serde_json::from_str::<T>(&text).map_err(ClientError::Decode)
}
