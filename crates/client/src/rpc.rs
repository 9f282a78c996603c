//! JSON-RPC ledger client.
//!
//! Speaks the host's HTTP RPC: account reads come back base64-encoded,
//! transactions go out as base64 wires, and a rejected submission keeps
//! the node's message and simulation logs verbatim.

use std::str::FromStr;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::hash::Hash;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RPC_TIMEOUT;
use crate::ledger::{LedgerError, LedgerReader, LedgerWriter, RawAccount, RejectReason};

/// Ledger client over a JSON-RPC node endpoint.
pub struct RpcLedger {
    url: String,
    http: reqwest::Client,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        debug!(method, "ledger rpc call");
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let payload: Value = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = payload.get("error") {
            return Err(error_from_rpc(method, error));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::InvalidResponse("missing result".to_string()))
    }
}

/// Map a JSON-RPC error object. Submission failures become rejections
/// carrying the node's simulation logs; read failures are malformed
/// responses.
fn error_from_rpc(method: &str, error: &Value) -> LedgerError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown rpc error")
        .to_string();
    if method != "sendTransaction" {
        return LedgerError::InvalidResponse(message);
    }
    let logs: Vec<String> = error
        .pointer("/data/logs")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let reason = RejectReason::classify(&message, &logs);
    LedgerError::Rejected {
        reason,
        message,
        logs,
    }
}

/// Parse the `value` object of a getAccountInfo response.
fn account_from_value(value: &Value) -> Result<RawAccount, LedgerError> {
    let lamports = value
        .get("lamports")
        .and_then(Value::as_u64)
        .ok_or_else(|| LedgerError::InvalidResponse("account lamports".to_string()))?;
    let owner = value
        .get("owner")
        .and_then(Value::as_str)
        .and_then(|s| Pubkey::from_str(s).ok())
        .ok_or_else(|| LedgerError::InvalidResponse("account owner".to_string()))?;
    let data = value
        .pointer("/data/0")
        .and_then(Value::as_str)
        .map(|encoded| BASE64.decode(encoded))
        .transpose()
        .map_err(|_| LedgerError::InvalidResponse("account data base64".to_string()))?
        .ok_or_else(|| LedgerError::InvalidResponse("account data".to_string()))?;
    Ok(RawAccount {
        lamports,
        owner,
        data,
    })
}

#[async_trait]
impl LedgerReader for RpcLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<RawAccount>, LedgerError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": "confirmed" }
                ]),
            )
            .await?;
        match result.get("value") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(account_from_value(value)?)),
        }
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        let result = self
            .call(
                "getBalance",
                json!([address.to_string(), { "commitment": "confirmed" }]),
            )
            .await?;
        result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| LedgerError::InvalidResponse("balance value".to_string()))
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let result = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": "confirmed" }]),
            )
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .and_then(|s| Hash::from_str(s).ok())
            .ok_or_else(|| LedgerError::InvalidResponse("blockhash".to_string()))
    }
}

#[async_trait]
impl LedgerWriter for RpcLedger {
    async fn send_transaction(&self, wire: &[u8]) -> Result<String, LedgerError> {
        let encoded = BASE64.encode(wire);
        debug!(bytes = wire.len(), "submitting transaction");
        let result = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    { "encoding": "base64", "preflightCommitment": "confirmed" }
                ]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::InvalidResponse("transaction signature".to_string()))
    }
}
