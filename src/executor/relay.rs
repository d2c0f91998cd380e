//! Relay Submission - JSON-RPC execution backend
//!
//! Signed batches are posted to an execution relay. Every request carries
//! an `X-Relay-Signature: address:0xsig` header signed by the relay-auth
//! credential, which is separate from the key that signs the swaps.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{ConfirmationStatus, ExecutionBackend, TxSignature};
use super::signer::{Credential, SignedBatch};
use crate::errors::BackendError;

// ============================================
// RPC METHODS
// ============================================

pub struct RelayMethods;

impl RelayMethods {
    pub const SUBMIT_BATCH: &'static str = "swap_submitBatch";
    pub const GET_STATUS: &'static str = "swap_getStatus";
}

/// Program error code the relay reports for an underfunded account
const INSUFFICIENT_FUNDS_CODE: &str = "0x1";
/// Program error code the relay reports when a min-out guard trips
const SLIPPAGE_CODE: &str = "0x1771";

// ============================================
// ERROR MAPPING
// ============================================

/// Map a JSON-RPC error object to a backend error
pub fn classify_rpc_error(error: &Value) -> BackendError {
    let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
    let message = error
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    let data = error
        .get("data")
        .map(|d| match d.as_str() {
            Some(s) => s.to_string(),
            None => d.to_string(),
        })
        .unwrap_or_default();

    let lowered = message.to_lowercase();
    if data.contains(SLIPPAGE_CODE) || lowered.contains("slippage") {
        return BackendError::SlippageExceeded(message);
    }
    if data.trim_matches('"') == INSUFFICIENT_FUNDS_CODE || lowered.contains("insufficient") {
        return BackendError::InsufficientFunds(message);
    }

    match code {
        -32005 | 429 => BackendError::RateLimited,
        -32602 | -32601 | -32600 => BackendError::InvalidInstruction(message),
        -32603 | -32099..=-32000 => BackendError::Network(format!("relay error {}: {}", code, message)),
        _ => BackendError::InvalidInstruction(format!("code {}: {}", code, message)),
    }
}

fn parse_status(status: &str) -> Option<ConfirmationStatus> {
    match status.to_ascii_lowercase().as_str() {
        "pending" | "processing" => Some(ConfirmationStatus::Pending),
        "confirmed" | "finalized" | "landed" => Some(ConfirmationStatus::Confirmed),
        "failed" | "reverted" | "dropped" => Some(ConfirmationStatus::Failed),
        "timeout" | "expired" => Some(ConfirmationStatus::Timeout),
        _ => None,
    }
}

// ============================================
// RELAY CLIENT
// ============================================

/// Client for a JSON-RPC execution relay
pub struct RelayBackend {
    http_client: Client,
    relay_url: String,
    auth: Credential,
    atomic: bool,
}

impl RelayBackend {
    pub fn new(relay_url: &str, auth: Credential, atomic: bool, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("building relay HTTP client")?;

        Ok(Self {
            http_client,
            relay_url: relay_url.to_string(),
            auth,
            atomic,
        })
    }

    /// Address the relay sees on every request
    pub fn auth_address(&self) -> alloy_primitives::Address {
        self.auth.address()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params]
        });

        let body = serde_json::to_string(&request)
            .map_err(|e| BackendError::InvalidInstruction(format!("encoding request: {}", e)))?;
        let signature = self
            .auth
            .sign_request(&body)
            .await
            .map_err(|e| BackendError::InvalidInstruction(e.to_string()))?;

        debug!("Calling {} at {}", method, self.relay_url);

        let response = self
            .http_client
            .post(&self.relay_url)
            .header("Content-Type", "application/json")
            .header("X-Relay-Signature", &signature)
            .body(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if status.is_server_error() {
            return Err(BackendError::Network(format!("relay returned HTTP {}", status)));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Network(format!("decoding response: {}", e)))?;

        debug!("Relay response status: {}", status);
        debug!("Relay response: {:?}", response_body);

        if let Some(error) = response_body.get("error") {
            return Err(classify_rpc_error(error));
        }

        response_body
            .get("result")
            .cloned()
            .ok_or_else(|| BackendError::Network("response has no result".to_string()))
    }
}

#[async_trait]
impl ExecutionBackend for RelayBackend {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn supports_atomic(&self) -> bool {
        self.atomic
    }

    async fn submit(&self, batch: &SignedBatch) -> Result<TxSignature, BackendError> {
        let params = serde_json::to_value(batch)
            .map_err(|e| BackendError::InvalidInstruction(format!("encoding batch: {}", e)))?;
        let result = self.call(RelayMethods::SUBMIT_BATCH, params).await?;

        let signature = result
            .as_str()
            .or_else(|| result.get("signature").and_then(|s| s.as_str()))
            .map(String::from)
            .ok_or_else(|| BackendError::Network("relay did not return a signature".to_string()))?;

        info!("Batch of {} submitted: {}", batch.len(), signature);
        Ok(TxSignature(signature))
    }

    async fn confirm(&self, signature: &TxSignature) -> Result<ConfirmationStatus, BackendError> {
        let result = self
            .call(RelayMethods::GET_STATUS, json!({ "signature": signature.0 }))
            .await?;

        let raw = result
            .as_str()
            .or_else(|| result.get("status").and_then(|s| s.as_str()))
            .unwrap_or_default();

        parse_status(raw).ok_or_else(|| BackendError::Network(format!("unknown status '{}'", raw)))
    }
}
