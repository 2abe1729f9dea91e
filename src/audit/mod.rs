//! Audit side channel.
//!
//! Successful forwarded operations are reported to the audit ledger as one
//! `POST {url}/tx` each. Delivery is best effort: the call runs in its own
//! task with a short timeout, is never retried, and never affects the
//! response returned to the client.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::AuditConfig;
use crate::observability::metrics;

/// One ledger transaction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub user: String,
    pub action: String,
    pub file_id: String,
    pub details: BTreeMap<String, String>,
}

impl AuditRecord {
    pub fn new(user: impl Into<String>, action: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            action: action.into(),
            file_id: file_id.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Fire-and-forget client for the audit ledger.
#[derive(Debug, Clone)]
pub struct AuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl AuditSink {
    /// Build a sink from configuration. Returns `None` when auditing is disabled.
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build audit client, auditing disabled");
                return None;
            }
        };
        Some(Self {
            client,
            endpoint: format!("{}/tx", config.url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `record` in the background. Failures are logged and counted only.
    ///
    /// The returned handle resolves to whether the ledger accepted the record;
    /// callers on the request path drop it.
    pub fn record(&self, record: AuditRecord) -> JoinHandle<bool> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            match client.post(&endpoint).json(&record).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::trace!(action = %record.action, "Audit record delivered");
                    true
                }
                Ok(resp) => {
                    metrics::record_audit_failure();
                    tracing::debug!(status = %resp.status(), action = %record.action, "Audit ledger rejected record");
                    false
                }
                Err(e) => {
                    metrics::record_audit_failure();
                    tracing::debug!(error = %e, action = %record.action, "Audit record dropped");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_yields_no_sink() {
        assert!(AuditSink::from_config(&AuditConfig::default()).is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = AuditConfig {
            enabled: true,
            url: "http://ledger:8006/".into(),
            timeout_ms: 100,
        };
        let sink = AuditSink::from_config(&config).unwrap();
        assert_eq!(sink.endpoint(), "http://ledger:8006/tx");
    }

    #[test]
    fn test_record_serialization() {
        let record = AuditRecord::new("alice", "GEN_REKEY", "rk_1").detail("node", "node-1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user": "alice",
                "action": "GEN_REKEY",
                "file_id": "rk_1",
                "details": {"node": "node-1"}
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_swallowed() {
        let config = AuditConfig {
            enabled: true,
            url: "http://127.0.0.1:1".into(),
            timeout_ms: 100,
        };
        let sink = AuditSink::from_config(&config).unwrap();

        let started = std::time::Instant::now();
        let delivery = sink.record(AuditRecord::new("alice", "REENCRYPT", "rk_1"));
        assert!(started.elapsed() < Duration::from_millis(50), "record must not wait for the ledger");

        let delivered = tokio::time::timeout(Duration::from_secs(1), delivery)
            .await
            .expect("delivery task outlived the audit timeout")
            .expect("delivery task panicked");
        assert!(!delivered);
    }
}
