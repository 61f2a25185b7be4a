//! JSON-RPC ledger client.

use super::{Confirmation, Ledger, LedgerError};
use crate::domain::{Address, InstrumentId, TxHash};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ledger node reachable over JSON-RPC 2.0.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: Client,
    url: String,
    poll_interval: Duration,
    next_id: Arc<AtomicU64>,
}

impl RpcLedger {
    pub fn new(url: String, poll_interval: Duration) -> Self {
        Self {
            client: Client::new(),
            url,
            poll_interval,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Single request, with the failure already classified for the retry policy.
    async fn send(&self, method: &str, params: &Value) -> Result<Value, backoff::Error<LedgerError>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(LedgerError::NetworkError(e.to_string())))?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(LedgerError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(LedgerError::HttpError {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(LedgerError::HttpError {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| backoff::Error::permanent(LedgerError::ParseError(e.to_string())))?;

        parse_rpc_response(body).map_err(backoff::Error::permanent)
    }

    /// Idempotent read with exponential backoff on transient failures.
    async fn call_read(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async { self.send(method, &params).await }).await
    }

    /// Non-idempotent write: exactly one attempt.
    async fn call_once(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.send(method, &params).await.map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn list_holders(&self, instrument: &InstrumentId) -> Result<Vec<Address>, LedgerError> {
        debug!(instrument = %instrument, "Listing holders");
        let result = self
            .call_read("ledger_listHolders", json!([instrument.as_str()]))
            .await?;
        parse_address_list(&result)
    }

    async fn get_balance(
        &self,
        address: &Address,
        instrument: &InstrumentId,
    ) -> Result<u128, LedgerError> {
        let result = self
            .call_read(
                "ledger_getBalance",
                json!([address.as_str(), instrument.as_str()]),
            )
            .await?;
        parse_amount(&result)
    }

    async fn transfer(
        &self,
        signer: &Address,
        recipient: &Address,
        amount: u128,
        instrument: &InstrumentId,
    ) -> Result<TxHash, LedgerError> {
        debug!(
            signer = %signer,
            recipient = %recipient,
            amount = %amount,
            instrument = %instrument,
            "Submitting transfer"
        );
        let result = self
            .call_once(
                "ledger_transfer",
                json!([{
                    "from": signer.as_str(),
                    "to": recipient.as_str(),
                    "amount": amount.to_string(),
                    "instrument": instrument.as_str(),
                }]),
            )
            .await?;

        result
            .as_str()
            .or_else(|| result.get("hash").and_then(|v| v.as_str()))
            .map(|s| TxHash::new(s.to_string()))
            .ok_or_else(|| LedgerError::ParseError("Missing transaction hash".to_string()))
    }

    async fn wait_for_confirmation(&self, hash: &TxHash) -> Result<Confirmation, LedgerError> {
        loop {
            let result = self
                .call_read("ledger_getTransactionStatus", json!([hash.as_str()]))
                .await?;

            match parse_tx_status(&result)? {
                Some(confirmation) => return Ok(confirmation),
                None => {
                    debug!(tx = %hash, "Transaction pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn current_block_height(&self) -> Result<u64, LedgerError> {
        let result = self.call_read("ledger_blockNumber", json!([])).await?;
        parse_block_height(&result)
    }
}

fn parse_rpc_response(body: Value) -> Result<Value, LedgerError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();
        if message.to_ascii_lowercase().contains("insufficient") {
            return Err(LedgerError::InsufficientFunds(message));
        }
        return Err(LedgerError::RpcError { code, message });
    }

    body.get("result")
        .cloned()
        .ok_or_else(|| LedgerError::ParseError("Missing result field".to_string()))
}

fn parse_address_list(result: &Value) -> Result<Vec<Address>, LedgerError> {
    let entries = result
        .as_array()
        .ok_or_else(|| LedgerError::ParseError("Expected array of addresses".to_string()))?;

    let mut addresses = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_str().map(str::trim).filter(|s| !s.is_empty()) {
            Some(addr) => addresses.push(Address::new(addr.to_string())),
            None => warn!("Skipping malformed holder entry: {}", entry),
        }
    }
    Ok(addresses)
}

/// Amounts arrive as decimal strings, hex strings, or small JSON integers.
fn parse_amount(result: &Value) -> Result<u128, LedgerError> {
    match result {
        Value::String(s) => parse_integer_str(s),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| LedgerError::ParseError(format!("Invalid amount: {}", n))),
        other => Err(LedgerError::ParseError(format!("Invalid amount: {}", other))),
    }
}

fn parse_block_height(result: &Value) -> Result<u64, LedgerError> {
    let height = parse_amount(result)?;
    u64::try_from(height)
        .map_err(|_| LedgerError::ParseError(format!("Block height out of range: {}", height)))
}

fn parse_integer_str(s: &str) -> Result<u128, LedgerError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => s.parse::<u128>(),
    };
    parsed.map_err(|e| LedgerError::ParseError(format!("Invalid integer {:?}: {}", s, e)))
}

/// `None` while the transaction is still pending.
fn parse_tx_status(result: &Value) -> Result<Option<Confirmation>, LedgerError> {
    let status = result
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LedgerError::ParseError("Missing status field".to_string()))?;

    match status {
        "pending" => Ok(None),
        "success" => Ok(Some(Confirmation::confirmed())),
        "failed" => {
            let reason = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("transaction failed");
            Ok(Some(Confirmation::rejected(reason)))
        }
        other => Err(LedgerError::ParseError(format!(
            "Unknown transaction status: {}",
            other
        ))),
    }
}
