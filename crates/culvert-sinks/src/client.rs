//! Outbound HTTP client for the sink peer protocol.
//!
//! Two calls: POST `{endpoint}/execute` to deliver a task and GET
//! `{endpoint}/heartbeat` for poll-style liveness. The client sits
//! behind a trait so the manager can be exercised without a live sink.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Wire body of a task delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDelivery {
    pub execution_id: String,
    pub wasm_ref: String,
    pub input: Map<String, Value>,
}

/// The sink's answer to a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReply {
    pub execution_id: String,
    pub accepted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A heartbeat read back from a polled sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub sink_id: String,
    pub ram_available_mb: u32,
    pub storage_available_mb: u32,
}

/// The sink side of the wire, as seen from the manager.
#[async_trait]
pub trait SinkClient: Send + Sync {
    async fn deliver_task(
        &self,
        endpoint: &str,
        delivery: &TaskDelivery,
    ) -> anyhow::Result<DeliveryReply>;

    async fn fetch_heartbeat(&self, endpoint: &str) -> anyhow::Result<HeartbeatReport>;
}

/// reqwest-backed implementation with a bounded per-request timeout.
pub struct HttpSinkClient {
    http: reqwest::Client,
}

impl HttpSinkClient {
    pub fn new(timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to configure sink http client; using defaults");
                reqwest::Client::new()
            }
        };
        Self { http }
    }
}

#[async_trait]
impl SinkClient for HttpSinkClient {
    async fn deliver_task(
        &self,
        endpoint: &str,
        delivery: &TaskDelivery,
    ) -> anyhow::Result<DeliveryReply> {
        let url = format!("{endpoint}/execute");
        let resp = self.http.post(&url).json(delivery).send().await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("task delivery returned status {status}");
        }
        Ok(resp.json::<DeliveryReply>().await?)
    }

    async fn fetch_heartbeat(&self, endpoint: &str) -> anyhow::Result<HeartbeatReport> {
        let url = format!("{endpoint}/heartbeat");
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("heartbeat returned status {status}");
        }
        Ok(resp.json::<HeartbeatReport>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_to_dead_endpoint_errors() {
        let client = HttpSinkClient::new(Duration::from_millis(200));
        let delivery = TaskDelivery {
            execution_id: "e1".to_string(),
            wasm_ref: "adder".to_string(),
            input: Map::new(),
        };
        // Port 1 is never listening.
        let result = client.deliver_task("http://127.0.0.1:1", &delivery).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn heartbeat_poll_to_dead_endpoint_errors() {
        let client = HttpSinkClient::new(Duration::from_millis(200));
        let result = client.fetch_heartbeat("http://127.0.0.1:1").await;
        assert!(result.is_err());
    }
}
