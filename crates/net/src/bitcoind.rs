//! Minimal JSON-RPC client for a trusted bitcoind.
//!
//! The node binary uses this as its stand-in peer manager: a single trusted
//! node answering `getheaders`-shaped queries over RPC.  Only the handful
//! of header-related calls are wrapped.

use base64::Engine;
use bitcoin::block::Header;
use bitcoin::BlockHash;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{NetError, NetResult};
use crate::explorer::decode_header_hex;

/// An error returned by the Bitcoin RPC.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// JSON-RPC response envelope; the result is usually a string in Bitcoin
/// Core.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct Response<R = String> {
    pub result: Option<R>,
    pub error: Option<RpcError>,
    pub id: String,
}

/// The fields we read from a verbose `getblockheader` reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockHeaderInfo {
    pub height: u32,
    pub confirmations: i64,
}

#[derive(Debug, Clone)]
pub struct BitcoindClient {
    url: String,
    client: reqwest::Client,
}

impl BitcoindClient {
    pub fn new(url: String, username: &str, password: &str) -> Self {
        let mut headers = HeaderMap::new();
        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        headers.insert(
            "Authorization",
            format!("Basic {auth}")
                .parse()
                .expect("bitcoind: auth header"),
        );
        headers.insert(
            "Content-Type",
            "application/json".parse().expect("bitcoind: content type"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("bitcoind: build http client");

        Self { url, client }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> NetResult<T> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "1.0",
                "id": method,
                "method": method,
                "params": params
            }))
            .send()
            .await?
            .json::<Response<T>>()
            .await?;

        if let Some(error) = response.error {
            return Err(NetError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| NetError::MissingResult(method.to_string()))
    }

    pub async fn get_block_count(&self) -> NetResult<u64> {
        self.call("getblockcount", vec![]).await
    }

    pub async fn get_block_hash(&self, height: u64) -> NetResult<BlockHash> {
        let hash: String = self.call("getblockhash", vec![json!(height)]).await?;
        hash.parse::<BlockHash>()
            .map_err(|e| NetError::BadPayload(format!("block hash: {e}")))
    }

    /// Header placement info (`getblockheader` with `verbose=true`).
    /// Confirmations are negative for headers off the main chain.
    pub async fn get_block_header_info(&self, hash: &BlockHash) -> NetResult<BlockHeaderInfo> {
        self.call("getblockheader", vec![json!(hash.to_string()), json!(true)])
            .await
    }

    /// The raw header for a hash (`getblockheader` with `verbose=false`).
    pub async fn get_block_header(&self, hash: &BlockHash) -> NetResult<Header> {
        let hex: String = self
            .call("getblockheader", vec![json!(hash.to_string()), json!(false)])
            .await?;
        decode_header_hex(hex.trim())
    }

    pub async fn get_block_header_at(&self, height: u64) -> NetResult<Header> {
        let hash = self.get_block_hash(height).await?;
        self.get_block_header(&hash).await
    }
}
