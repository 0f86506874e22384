//! evm-rpc-client: JSON-RPC client for the vault's on-chain reads
//!
//! Wraps an HTTP JSON-RPC endpoint with per-request timeouts, bounded retry
//! for transient failures, and typed reads of the token, Permit2 and vault
//! contracts.

pub mod abi;
pub mod reader;
pub mod retry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vault_core::{Address, ChainConfig, ChainError, ContractConfig};

pub use reader::{ChainStateReader, ChainTxStatus, TransactionStatusSource};
pub use retry::{with_retry, RetryPolicy};

/// Result type for RPC operations
pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client bound to one endpoint and one set of contracts
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    retry: RetryPolicy,
    contracts: ContractConfig,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(chain: &ChainConfig, contracts: ContractConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("vaultd")
            .build()
            .map_err(|e| ChainError::Unreachable {
                url: chain.rpc_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            url: chain.rpc_url.clone(),
            timeout: Duration::from_secs(chain.request_timeout_secs),
            retry: RetryPolicy::from_config(chain),
            contracts,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Override the retry policy (tests, or callers that retry themselves)
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn contracts(&self) -> &ContractConfig {
        &self.contracts
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Issue one JSON-RPC request (no retry)
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        tracing::debug!("RPC {} (id {})", method, id);

        let response = self
            .timed_request(self.http.post(&self.url).json(&body).send())
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let parsed: RpcResponse = self
            .timed_request(response.json())
            .await
            .map_err(|e| match e {
                ChainError::Unreachable { message, .. } => ChainError::ParseError(message),
                other => other,
            })?;

        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(parsed.result.unwrap_or(serde_json::Value::Null))
    }

    /// Read-only contract call against the latest block; returns raw return data
    pub async fn eth_call(&self, to: &Address, data: &str) -> Result<Vec<u8>> {
        let params = serde_json::json!([{ "to": to.as_str(), "data": data }, "latest"]);
        let result = self.request("eth_call", params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ChainError::ParseError(format!("eth_call returned {}", result)))?;
        abi::decode_hex(hex)
    }

    /// `eth_chainId` as a number
    pub async fn chain_id(&self) -> Result<u64> {
        let result = self.request("eth_chainId", serde_json::json!([])).await?;
        parse_quantity(&result, "chain id")
    }

    /// Check if the endpoint answers at all
    pub async fn is_online(&self) -> bool {
        self.request("eth_blockNumber", serde_json::json!([]))
            .await
            .is_ok()
    }

    /// Apply the configured request timeout and map transport errors
    async fn timed_request<T>(
        &self,
        fut: impl std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ChainError::Unreachable {
                url: self.url.clone(),
                message: e.to_string(),
            })
    }
}

/// Parse a `0x`-prefixed JSON-RPC quantity
pub fn parse_quantity(value: &serde_json::Value, field: &'static str) -> Result<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::ParseError(format!("{} is not a hex string: {}", field, value)))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::ParseError(format!("Invalid {} '{}': {}", field, text, e)))
}

#[cfg(test)]
pub(crate) mod test_server {
    //! In-process JSON-RPC endpoint answering from a fixed method table

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};

    #[derive(Clone, Default)]
    pub struct FakeNode {
        /// method -> result, or keyed by `method:selector` for eth_call
        pub results: Arc<Mutex<HashMap<String, Value>>>,
        pub calls: Arc<Mutex<Vec<Value>>>,
    }

    impl FakeNode {
        pub fn set(&self, key: &str, result: Value) {
            self.results
                .lock()
                .unwrap()
                .insert(key.to_string(), result);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    async fn handle(State(node): State<FakeNode>, Json(req): Json<Value>) -> Json<Value> {
        node.calls.lock().unwrap().push(req.clone());
        let method = req["method"].as_str().unwrap_or_default().to_string();
        let key = if method == "eth_call" {
            let data = req["params"][0]["data"].as_str().unwrap_or_default();
            format!("eth_call:{}", &data[..10.min(data.len())])
        } else {
            method
        };

        let results = node.results.lock().unwrap();
        match results.get(&key) {
            Some(result) if result.get("__error").is_some() => Json(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": result["__error"],
            })),
            Some(result) => Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": result})),
            None => Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": null})),
        }
    }

    /// Start the fake node; returns its URL
    pub async fn spawn(node: FakeNode) -> String {
        let app = Router::new().route("/", post(handle)).with_state(node);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
