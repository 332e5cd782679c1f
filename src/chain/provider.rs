use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::chain::address::Address;
use crate::chain::models::{LogEntry, TxReceipt};
use crate::error::{AppError, AppResult};

/// Capability to fetch a transaction receipt by hash. Injected into the
/// reconciler and the synchronous open-run gate so tests can script
/// receipts instead of talking to a node.
#[async_trait]
pub trait ReceiptProvider: Send + Sync {
    /// `Ok(None)` means the transaction is not mined yet; an `Err` is a
    /// transient RPC failure. Callers treat both as "retry later".
    async fn transaction_receipt(&self, tx_hash: &str) -> AppResult<Option<TxReceipt>>;
}

/// JSON-RPC receipt client (`eth_getTransactionReceipt`).
pub struct EthRpcProvider {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RawReceipt>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: String,
    block_number: String,
    logs: Vec<RawLog>,
}

#[derive(Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

fn parse_quantity(hex_str: &str) -> AppResult<u64> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u64::from_str_radix(stripped, 16)
        .map_err(|_| AppError::Rpc(format!("Malformed hex quantity: {}", hex_str)))
}

fn parse_bytes(hex_str: &str) -> AppResult<Vec<u8>> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(stripped).map_err(|_| AppError::Rpc(format!("Malformed hex data: {}", hex_str)))
}

fn parse_topic(hex_str: &str) -> AppResult<[u8; 32]> {
    let raw = parse_bytes(hex_str)?;
    if raw.len() != 32 {
        return Err(AppError::Rpc(format!("Topic is not 32 bytes: {}", hex_str)));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&raw);
    Ok(out)
}

impl EthRpcProvider {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    fn convert(raw: RawReceipt) -> AppResult<TxReceipt> {
        let mut logs = Vec::with_capacity(raw.logs.len());
        for log in raw.logs {
            let address: Address = log.address.parse()?;
            let topics = log
                .topics
                .iter()
                .map(|t| parse_topic(t))
                .collect::<AppResult<Vec<_>>>()?;
            logs.push(LogEntry {
                address,
                topics,
                data: parse_bytes(&log.data)?,
            });
        }
        Ok(TxReceipt {
            success: parse_quantity(&raw.status)? == 1,
            block_number: parse_quantity(&raw.block_number)?,
            logs,
        })
    }
}

#[async_trait]
impl ReceiptProvider for EthRpcProvider {
    async fn transaction_receipt(&self, tx_hash: &str) -> AppResult<Option<TxReceipt>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(AppError::Rpc(format!("eth_getTransactionReceipt: {}", err)));
        }

        match response.result {
            // null result: not mined yet
            None => {
                debug!(tx_hash, "Receipt not yet available");
                Ok(None)
            }
            Some(raw) => Ok(Some(Self::convert(raw)?)),
        }
    }
}
