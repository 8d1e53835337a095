//! HTTP settlement gateway client.
//!
//! The gateway owns key management and transaction signing; this client only
//! submits batches and reads their status.

use super::{SettlementClient, SettlementError, SettlementReceipt};
use crate::domain::{Decimal, SettlementTransfer};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Method};
use std::time::Duration;
use uuid::Uuid;
use tracing::{debug, warn};

/// Settlement client talking to the gateway's REST API.
#[derive(Debug, Clone)]
pub struct HttpSettlementClient {
    client: Client,
    base_url: String,
}

impl HttpSettlementClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        max_elapsed: Duration,
    ) -> Result<serde_json::Value, SettlementError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        // One request id across retries so the gateway can correlate attempts.
        let request_id = Uuid::new_v4().to_string();

        retry(backoff, || async {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-Request-Id", request_id.as_str());
            if let Some(body) = &body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(SettlementError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(SettlementError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == 409 {
                return Err(backoff::Error::permanent(SettlementError::Rejected(
                    "Conflict".to_string(),
                )));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(SettlementError::HttpError {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(SettlementError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl SettlementClient for HttpSettlementClient {
    async fn submit_batch(
        &self,
        batch_id: &str,
        transfers: &[SettlementTransfer],
    ) -> Result<SettlementReceipt, SettlementError> {
        debug!(batch_id = batch_id, transfers = transfers.len(), "Submitting batch");

        let payload = serde_json::json!({
            "batchId": batch_id,
            "transfers": transfers,
        });

        // A network failure after the gateway accepted the batch is retried
        // here; the gateway's batch-id dedup answers 409 instead of paying twice.
        let response = self
            .send_json(
                Method::POST,
                "/batches",
                Some(payload),
                Duration::from_secs(20),
            )
            .await
            .map_err(|e| match e {
                SettlementError::Rejected(_) => {
                    SettlementError::AlreadyProcessed(batch_id.to_string())
                }
                other => other,
            })?;

        parse_receipt(&response)
    }

    async fn is_batch_processed(&self, batch_id: &str) -> Result<bool, SettlementError> {
        let response = self
            .send_json(
                Method::GET,
                &format!("/batches/{}", batch_id),
                None,
                Duration::from_secs(10),
            )
            .await?;

        response
            .get("processed")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| SettlementError::ParseError("Missing processed field".to_string()))
    }

    async fn balance(&self) -> Result<Decimal, SettlementError> {
        let response = self
            .send_json(Method::GET, "/balance", None, Duration::from_secs(10))
            .await?;
        parse_balance(&response)
    }
}

fn parse_receipt(json: &serde_json::Value) -> Result<SettlementReceipt, SettlementError> {
    let tx_id = json
        .get("txId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SettlementError::ParseError("Missing txId field".to_string()))?;

    let block_ref = match json.get("blockRef") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => {
            warn!("Unexpected blockRef shape: {}", other);
            None
        }
    };

    Ok(SettlementReceipt {
        tx_id: tx_id.to_string(),
        block_ref,
    })
}

fn parse_balance(json: &serde_json::Value) -> Result<Decimal, SettlementError> {
    let balance_str = json
        .get("balance")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SettlementError::ParseError("Missing balance field".to_string()))?;
    Decimal::from_str_canonical(balance_str)
        .map_err(|e| SettlementError::ParseError(format!("Invalid balance: {}", e)))
}
