use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chain::RpcConfig;
use containers::{BlockHash, Height};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use crate::node::{NodeClient, NodeError};

/// JSON-RPC error code the node uses for invalid parameters, including a
/// `getblockhash` height above its tip.
pub const RPC_INVALID_PARAMETER: i64 = -8;

/// `getblock` verbosity returning the serialized block as hex.
const RAW_BLOCK_VERBOSITY: u8 = 0;

#[derive(Clone, PartialEq, Eq)]
pub struct RpcAuth {
    pub user: String,
    pub password: String,
}

impl RpcAuth {
    /// Reads a `user:password` cookie file as written by the node.
    pub fn from_cookie_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rpc cookie {}", path.display()))?;
        Self::parse_cookie(&contents)
            .with_context(|| format!("rpc cookie {} is not user:password", path.display()))
    }

    fn parse_cookie(contents: &str) -> Option<Self> {
        let (user, password) = contents.trim().split_once(':')?;
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

impl std::fmt::Debug for RpcAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Decodes a JSON-RPC 1.0 response body.
///
/// A populated `error` object wins over `result`, matching how the node
/// reports failures (often alongside a non-200 status).
pub fn parse_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, NodeError> {
    let response: RpcResponse<T> = serde_json::from_slice(body)
        .map_err(|err| NodeError::Malformed(format!("invalid json-rpc body: {err}")))?;

    if let Some(error) = response.error {
        return Err(NodeError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    response
        .result
        .ok_or_else(|| NodeError::Malformed("response has neither result nor error".to_string()))
}

/// Decodes a response body received with `status`.
///
/// The node sends RPC errors with non-200 statuses, so the body is parsed
/// first. Only a body that is not a JSON-RPC response turns into
/// [`NodeError::Http`] when the status is not a success.
fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, NodeError> {
    match parse_response(body) {
        Err(NodeError::Malformed(_)) if !status.is_success() => Err(NodeError::Http {
            status: status.as_u16(),
        }),
        result => result,
    }
}

/// Maps a `getblockhash` answer to the hash at that height.
///
/// [`RPC_INVALID_PARAMETER`] means the height is above the node's tip and
/// becomes `Ok(None)`. Every other error is passed through.
fn hash_at_height(
    height: Height,
    response: Result<String, NodeError>,
) -> Result<Option<BlockHash>, NodeError> {
    match response {
        Ok(hash) => parse_hash(&hash).map(Some),
        Err(NodeError::Rpc { code, message }) if code == RPC_INVALID_PARAMETER => {
            debug!(height = height.0, %message, "Height not produced yet");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn parse_hash(value: &str) -> Result<BlockHash, NodeError> {
    value
        .parse()
        .map_err(|err| NodeError::Malformed(format!("invalid block hash {value:?}: {err}")))
}

/// [`NodeClient`] backed by a node's JSON-RPC HTTP endpoint.
#[derive(Debug)]
pub struct BitcoindRpcClient {
    http: reqwest::Client,
    url: String,
    auth: Option<RpcAuth>,
    next_id: AtomicU64,
}

impl BitcoindRpcClient {
    pub fn new(
        url: impl Into<String>,
        auth: Option<RpcAuth>,
        timeout: Duration,
    ) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: url.into(),
            auth,
            next_id: AtomicU64::new(0),
        })
    }

    /// Builds a client from config. Explicit credentials take precedence
    /// over the cookie file.
    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let auth = match (&config.user, &config.password, &config.cookie_file) {
            (Some(user), Some(password), _) => Some(RpcAuth {
                user: user.clone(),
                password: password.clone(),
            }),
            (_, _, Some(cookie)) => Some(RpcAuth::from_cookie_file(cookie)?),
            _ => None,
        };

        info!(url = %config.url, authenticated = auth.is_some(), "Node rpc client configured");

        Ok(Self::new(config.url.clone(), auth, config.timeout())?)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!(id, method, "Sending rpc request");

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.password));
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        decode_body(status, &body)
    }
}

#[async_trait]
impl NodeClient for BitcoindRpcClient {
    async fn block_hash_at(&self, height: Height) -> Result<Option<BlockHash>, NodeError> {
        let response = self.call::<String>("getblockhash", json!([height.0])).await;
        hash_at_height(height, response)
    }

    async fn block_payload(&self, hash: &BlockHash) -> Result<Vec<u8>, NodeError> {
        let raw: String = self
            .call("getblock", json!([hash.to_string(), RAW_BLOCK_VERBOSITY]))
            .await?;
        Ok(hex::decode(raw.trim())?)
    }

    async fn current_tip_hash(&self) -> Result<BlockHash, NodeError> {
        let hash: String = self.call("getbestblockhash", json!([])).await?;
        parse_hash(&hash)
    }
}
