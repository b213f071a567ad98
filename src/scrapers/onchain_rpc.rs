//! Ethereum JSON-RPC transfer log reader
//!
//! Raw `eth_getLogs` over reqwest; no web3 stack needed for a single filter call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::models::TransferLog;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[async_trait]
pub trait TransferLogSource: Send + Sync {
    /// Transfer logs for `contract` from `from_block` up to `latest`.
    async fn fetch_transfer_logs(&self, contract: &str, from_block: &str)
        -> Result<Vec<TransferLog>>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Vec<TransferLog>>,
    error: Option<serde_json::Value>,
}

pub struct EthRpcClient {
    client: Client,
    /// `None` when no RPC credential is configured.
    rpc_url: Option<String>,
}

impl EthRpcClient {
    pub fn new(rpc_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to build RPC client")?;

        Ok(Self { client, rpc_url })
    }

    pub fn is_configured(&self) -> bool {
        self.rpc_url.is_some()
    }
}

#[async_trait]
impl TransferLogSource for EthRpcClient {
    async fn fetch_transfer_logs(
        &self,
        contract: &str,
        from_block: &str,
    ) -> Result<Vec<TransferLog>> {
        let Some(rpc_url) = self.rpc_url.as_deref() else {
            debug!(contract, "no RPC credential configured, skipping transfer fetch");
            return Ok(Vec::new());
        };

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getLogs",
            "params": [{
                "address": contract,
                "fromBlock": from_block,
                "toBlock": "latest",
                "topics": [TRANSFER_EVENT_TOPIC]
            }]
        });

        let response: JsonRpcResponse = self
            .client
            .post(rpc_url)
            .json(&payload)
            .send()
            .await
            .context("RPC request failed")?
            .json()
            .await
            .context("failed to parse RPC response")?;

        if let Some(err) = response.error {
            return Err(anyhow::anyhow!("RPC error: {:?}", err));
        }

        let logs = response.result.unwrap_or_default();
        debug!(contract, logs = logs.len(), "transfer logs fetched");
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_returns_no_logs() {
        let client = EthRpcClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        let logs = client
            .fetch_transfer_logs("0xb50721bcf8d664c30412cfbc6cf7a15145234ad1", "latest")
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[test]
    fn test_rpc_response_decoding() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": [{
                "address": "0xb50721bcf8d664c30412cfbc6cf7a15145234ad1",
                "topics": [
                    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                    "0x000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                    "0x00000000000000000000000028c6c06298d514db089934071355e5743bf21d60"
                ],
                "data": "0x01",
                "blockNumber": "0x10",
                "transactionHash": "0xabc"
            }]
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let logs = resp.result.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].topics.len(), 3);
        assert_eq!(logs[0].block_number.as_deref(), Some("0x10"));
    }
}
