//! # JSON-RPC Transport
//!
//! JSON-RPC 2.0 envelope types and the HTTP client that speaks them to a
//! chain node.
//!
//! The envelope follows the JSON-RPC 2.0 specification with chain methods
//! prefixed `chain_`. The transport is a deliberately small HTTP/1.1 POST
//! over a raw tokio TCP stream — one request, `Connection: close`, read to
//! end. The RPC node is on the same network segment in every deployment we
//! run, so connection pooling and TLS are handled upstream of this client.
//!
//! ## Method Index
//!
//! | Method                    | Description                             |
//! |--------------------------|------------------------------------------|
//! | `chain_getBalance`        | Native balance of an address, base units |
//! | `chain_getTokenBalance`   | Token balance of an owner for a mint     |
//! | `chain_getAccountInfo`    | Whether an account exists on chain       |
//! | `chain_submitTransfer`    | Submit a signed transfer                 |
//! | `chain_getSignatureStatus`| Confirmation status of a submission      |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::address::Address;
use super::client::{ChainClient, ChainError, Submission};
use super::keys::ChainKeypair;
use crate::config::{CONFIRMATION_TIMEOUT, RPC_REQUEST_TIMEOUT};

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Supported JSON-RPC methods.
///
/// The method name on the wire uses the string representation
/// (e.g. `"chain_getBalance"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    /// Native balance of an address in base units.
    /// Parameters: `(address: String)`
    #[serde(rename = "chain_getBalance")]
    GetBalance,
    /// Token balance held by an owner for a mint, in base units.
    /// Parameters: `(owner: String, mint: String)`
    #[serde(rename = "chain_getTokenBalance")]
    GetTokenBalance,
    /// Account existence check.
    /// Parameters: `(address: String)` — result is `null` for a missing account.
    #[serde(rename = "chain_getAccountInfo")]
    GetAccountInfo,
    /// Submit a signed transfer.
    /// Parameters: the serialized [`TransferPayload`].
    #[serde(rename = "chain_submitTransfer")]
    SubmitTransfer,
    /// Confirmation status of a previously submitted signature.
    /// Parameters: `(signature: String)`
    #[serde(rename = "chain_getSignatureStatus")]
    GetSignatureStatus,
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier, echoed back in the response.
    pub id: serde_json::Value,
    /// The method to invoke.
    pub method: RpcMethod,
    /// Method-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Creates a request with the given method and parameters.
    pub fn new(id: serde_json::Value, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// The request ID this response corresponds to.
    pub id: serde_json::Value,
    /// The successful result, if the method completed without error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error, if the method failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes (`-32700`..`-32603`) follow the specification; the
/// application range carries chain semantics:
/// - `-32003`: transaction rejected
/// - `-32010`: insufficient on-chain funds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Application error code: transaction rejected by the chain.
pub const CODE_TRANSACTION_REJECTED: i32 = -32003;
/// Application error code: sender lacks on-chain funds.
pub const CODE_INSUFFICIENT_FUNDS: i32 = -32010;

impl RpcErrorObject {
    fn into_chain_error(self) -> ChainError {
        match self.code {
            CODE_INSUFFICIENT_FUNDS => ChainError::InsufficientFunds,
            CODE_TRANSACTION_REJECTED => ChainError::Rejected(self.message),
            // Anything else — parse errors, internal errors, unknown
            // codes — means the node could not serve us.
            _ => ChainError::Unavailable(format!("rpc error {}: {}", self.code, self.message)),
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer payload
// ---------------------------------------------------------------------------

/// The signed transfer submitted through `chain_submitTransfer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPayload {
    /// Sender address, base58.
    pub from: String,
    /// Recipient address, base58. For token transfers this is the owner
    /// address; the node resolves the token accounts.
    pub to: String,
    /// Token mint, or `None` for a native transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    /// Amount in base units.
    pub base_units: u64,
    /// Whether the submission must also create the recipient's token
    /// account, paid by the sender.
    #[serde(default)]
    pub create_token_account: bool,
    /// Ed25519 signature over [`signing_bytes`](Self::signing_bytes), hex.
    pub signature: String,
}

impl TransferPayload {
    /// The canonical byte string the sender signs.
    ///
    /// Field order and separators are part of the wire contract; change
    /// them and every existing signature breaks.
    pub fn signing_bytes(
        from: &Address,
        to: &Address,
        mint: Option<&Address>,
        base_units: u64,
    ) -> Vec<u8> {
        format!(
            "transfer|{}|{}|{}|{}",
            from,
            to,
            mint.map(|m| m.as_str()).unwrap_or("-"),
            base_units
        )
        .into_bytes()
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`ChainClient`] over HTTP JSON-RPC.
///
/// Submissions poll `chain_getSignatureStatus` until the chain confirms
/// or the confirmation deadline passes; a deadline miss surfaces as
/// [`ChainError::Unavailable`] because the transaction's fate is unknown.
pub struct HttpChainClient {
    rpc_url: String,
    request_timeout: Duration,
    confirmation_timeout: Duration,
}

impl HttpChainClient {
    /// Creates a client against the given RPC URL with default timeouts.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            request_timeout: RPC_REQUEST_TIMEOUT,
            confirmation_timeout: CONFIRMATION_TIMEOUT,
        }
    }

    /// Overrides the confirmation deadline. Mostly for tests.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Performs one JSON-RPC call and returns the `result` value.
    ///
    /// A `null` (or absent) result comes back as [`serde_json::Value::Null`];
    /// the chain answers `null` for accounts it has never seen, and each
    /// caller decides what not-found means for its query.
    async fn call(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let request = RpcRequest::new(serde_json::json!(1), method, params);
        let body = serde_json::to_string(&request)
            .map_err(|e| ChainError::Unavailable(format!("request encoding failed: {e}")))?;

        let raw = tokio::time::timeout(self.request_timeout, self.post(&body))
            .await
            .map_err(|_| ChainError::Unavailable("rpc request timed out".to_string()))??;

        let response: RpcResponse = serde_json::from_str(&raw)
            .map_err(|e| ChainError::Unavailable(format!("malformed rpc response: {e}")))?;

        if let Some(error) = response.error {
            return Err(error.into_chain_error());
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// One-shot HTTP/1.1 POST over a raw TCP stream.
    async fn post(&self, body: &str) -> Result<String, ChainError> {
        let (host, port, path) = parse_http_url(&self.rpc_url)
            .ok_or_else(|| ChainError::Unavailable(format!("invalid rpc url: {}", self.rpc_url)))?;

        let addr = format!("{}:{}", host, port);
        let mut stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| ChainError::Unavailable(format!("connect to {addr} failed: {e}")))?;

        let request = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            host,
            body.len(),
            body,
        );

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| ChainError::Unavailable(format!("rpc write failed: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| ChainError::Unavailable(format!("rpc shutdown failed: {e}")))?;

        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ChainError::Unavailable(format!("rpc read failed: {e}")))?;
        let response = String::from_utf8_lossy(&buf);

        // Everything after the first blank line is the body.
        let response_body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_else(|| response.to_string());
        Ok(response_body)
    }

    /// `true` once an account exists on chain.
    async fn account_exists(&self, address: &Address) -> Result<bool, ChainError> {
        let result = self
            .call(
                RpcMethod::GetAccountInfo,
                serde_json::json!([address.as_str()]),
            )
            .await?;
        Ok(!result.is_null())
    }

    /// Submits a signed payload and waits for confirmation.
    async fn submit_and_confirm(
        &self,
        payload: &TransferPayload,
        created_token_account: bool,
    ) -> Result<Submission, ChainError> {
        let params = serde_json::to_value(payload)
            .map_err(|e| ChainError::Unavailable(format!("payload encoding failed: {e}")))?;
        let result = self.call(RpcMethod::SubmitTransfer, params).await?;

        let signature = result
            .get("signature")
            .and_then(|s| s.as_str())
            .ok_or_else(|| ChainError::Unavailable("submit response had no signature".into()))?
            .to_string();

        tokio::time::timeout(self.confirmation_timeout, self.wait_confirmed(&signature))
            .await
            .map_err(|_| {
                ChainError::Unavailable(format!("confirmation timed out for {signature}"))
            })??;

        Ok(Submission {
            signature,
            created_token_account,
        })
    }

    async fn wait_confirmed(&self, signature: &str) -> Result<(), ChainError> {
        loop {
            let status = self
                .call(
                    RpcMethod::GetSignatureStatus,
                    serde_json::json!([signature]),
                )
                .await?;
            match status.get("status").and_then(|s| s.as_str()) {
                Some("confirmed") | Some("finalized") => return Ok(()),
                Some("failed") => {
                    let reason = status
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .unwrap_or("transaction failed on chain");
                    return Err(ChainError::Rejected(reason.to_string()));
                }
                // Pending or unknown: keep polling.
                _ => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
    }

    fn validated(address: &Address) -> Result<(), ChainError> {
        if address.is_valid() {
            Ok(())
        } else {
            Err(ChainError::InvalidAddress(address.to_string()))
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn native_balance(&self, address: &Address) -> Result<u64, ChainError> {
        Self::validated(address)?;
        let result = self
            .call(RpcMethod::GetBalance, serde_json::json!([address.as_str()]))
            .await?;
        // An account the chain has never seen reads as zero.
        if result.is_null() {
            return Ok(0);
        }
        result
            .get("balance")
            .and_then(|b| b.as_u64())
            .ok_or_else(|| ChainError::Unavailable("balance response malformed".to_string()))
    }

    async fn token_balance(&self, owner: &Address, mint: &Address) -> Result<u64, ChainError> {
        Self::validated(owner)?;
        Self::validated(mint)?;
        let result = self
            .call(
                RpcMethod::GetTokenBalance,
                serde_json::json!([owner.as_str(), mint.as_str()]),
            )
            .await?;
        // A missing token account reads as zero.
        if result.is_null() {
            return Ok(0);
        }
        result
            .get("balance")
            .and_then(|b| b.as_u64())
            .ok_or_else(|| ChainError::Unavailable("token balance response malformed".to_string()))
    }

    async fn transfer_native(
        &self,
        from: &ChainKeypair,
        to: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError> {
        Self::validated(to)?;
        let from_addr = from.address();
        let message = TransferPayload::signing_bytes(&from_addr, to, None, base_units);
        let signature = from.sign(&message);

        let payload = TransferPayload {
            from: from_addr.to_string(),
            to: to.to_string(),
            mint: None,
            base_units,
            create_token_account: false,
            signature: hex::encode(signature.to_bytes()),
        };
        self.submit_and_confirm(&payload, false).await
    }

    async fn transfer_token(
        &self,
        from: &ChainKeypair,
        to: &Address,
        mint: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError> {
        Self::validated(to)?;
        Self::validated(mint)?;

        let recipient_token_account = to
            .derive_token_account(mint)
            .ok_or_else(|| ChainError::InvalidAddress(to.to_string()))?;
        let needs_account = !self.account_exists(&recipient_token_account).await?;

        let from_addr = from.address();
        let message = TransferPayload::signing_bytes(&from_addr, to, Some(mint), base_units);
        let signature = from.sign(&message);

        let payload = TransferPayload {
            from: from_addr.to_string(),
            to: to.to_string(),
            mint: Some(mint.to_string()),
            base_units,
            create_token_account: needs_account,
            signature: hex::encode(signature.to_bytes()),
        };
        self.submit_and_confirm(&payload, needs_account).await
    }
}

/// Splits an `http://host[:port][/path]` URL into parts.
///
/// Good enough for RPC endpoints; anything fancier (TLS, userinfo, IPv6
/// literals) is out of scope for this transport.
fn parse_http_url(url: &str) -> Option<(String, u16, String)> {
    let rest = url.strip_prefix("http://")?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse().ok()?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port, path.to_string()))
}
