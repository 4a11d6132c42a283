use std::time::Duration;

use async_trait::async_trait;
use fleetcast_core::operation::SignedOperation;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ConnectorError;

/// Where a submitted operation stands on-chain, as reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Accepted but no receipt yet.
    Pending,
    Confirmed { tx_hash: String },
    Failed { reason: String },
}

/// Submission endpoint for signed wallet operations. `submit_operation`
/// returns an opaque tracking handle; `operation_status` polls it.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait BundlerClient: Send + Sync {
    async fn submit_operation(&self, signed: &SignedOperation) -> Result<String, ConnectorError>;
    async fn operation_status(&self, handle: &str) -> Result<OperationStatus, ConnectorError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserOperation {
    sender: String,
    to: String,
    value: String,
    data: String,
    nonce: String,
    signature: String,
}

impl UserOperation {
    fn from_signed(signed: &SignedOperation) -> Self {
        let op = &signed.operation;
        Self {
            sender: format!("{:#x}", op.sender),
            to: format!("{:#x}", op.to),
            value: format!("{:#x}", op.value),
            data: format!("0x{}", alloy::hex::encode(&op.data)),
            nonce: format!("{:#x}", op.nonce),
            signature: format!("0x{}", alloy::hex::encode(&signed.signature)),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationReceipt {
    success: bool,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// JSON-RPC client for the bundler service.
#[derive(Debug, Clone)]
pub struct HttpBundlerClient {
    client: reqwest::Client,
    url: String,
}

impl HttpBundlerClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::bundler(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Option<Value>, ConnectorError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConnectorError::bundler(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConnectorError::bundler(format!(
                "{method}: http {status}: {text}"
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::bundler(format!("{method}: decode response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(ConnectorError::bundler(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(parsed.result)
    }
}

#[async_trait]
impl BundlerClient for HttpBundlerClient {
    async fn submit_operation(&self, signed: &SignedOperation) -> Result<String, ConnectorError> {
        let op = UserOperation::from_signed(signed);
        let result = self
            .rpc_call("eth_sendUserOperation", json!([op]))
            .await?
            .ok_or_else(|| ConnectorError::bundler("eth_sendUserOperation: empty result"))?;

        let handle = result
            .as_str()
            .ok_or_else(|| ConnectorError::bundler("eth_sendUserOperation: non-string result"))?
            .to_string();
        debug!(handle = %handle, sender = %signed.operation.sender, "operation submitted");
        Ok(handle)
    }

    async fn operation_status(&self, handle: &str) -> Result<OperationStatus, ConnectorError> {
        let result = self
            .rpc_call("eth_getUserOperationReceipt", json!([handle]))
            .await?;

        // Null result means the bundler has not landed the operation yet.
        let receipt_value = match result {
            None | Some(Value::Null) => return Ok(OperationStatus::Pending),
            Some(v) => v,
        };

        let receipt: OperationReceipt = serde_json::from_value(receipt_value).map_err(|e| {
            ConnectorError::bundler(format!("eth_getUserOperationReceipt: decode receipt: {e}"))
        })?;

        if receipt.success {
            let tx_hash = receipt.transaction_hash.ok_or_else(|| {
                ConnectorError::bundler("eth_getUserOperationReceipt: success without hash")
            })?;
            Ok(OperationStatus::Confirmed { tx_hash })
        } else {
            Ok(OperationStatus::Failed {
                reason: receipt
                    .reason
                    .unwrap_or_else(|| "reverted on-chain".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256, address};
    use fleetcast_core::operation::WalletOperation;

    fn signed_op() -> SignedOperation {
        SignedOperation {
            operation: WalletOperation {
                sender: address!("00000000000000000000000000000000000000aa"),
                to: address!("00000000000000000000000000000000000000bb"),
                value: U256::from(1_000u64),
                data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
                nonce: 7,
            },
            signature: Bytes::from(vec![0x11; 65]),
        }
    }

    #[test]
    fn user_operation_wire_encoding() {
        let op = UserOperation::from_signed(&signed_op());
        assert_eq!(op.sender, "0x00000000000000000000000000000000000000aa");
        assert_eq!(op.value, "0x3e8");
        assert_eq!(op.nonce, "0x7");
        assert_eq!(op.data, "0xa9059cbb");
        assert!(op.signature.starts_with("0x1111"));
    }

    #[test]
    fn receipt_decoding() {
        let confirmed: OperationReceipt = serde_json::from_value(json!({
            "success": true,
            "transactionHash": "0xdeadbeef",
        }))
        .unwrap();
        assert!(confirmed.success);
        assert_eq!(confirmed.transaction_hash.as_deref(), Some("0xdeadbeef"));

        let failed: OperationReceipt = serde_json::from_value(json!({
            "success": false,
            "reason": "AA25 invalid account nonce",
        }))
        .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.reason.as_deref(), Some("AA25 invalid account nonce"));
    }

    #[test]
    fn rpc_error_shape() {
        let parsed: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "invalid params" },
        }))
        .unwrap();
        let err = parsed.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "invalid params");
        assert!(parsed.result.is_none());
    }
}
