//! Block-explorer lookup for the custom-start bootstrap.
//!
//! One esplora-style HTTPS round per header: resolve the height to a hash,
//! then fetch the raw 80-byte header.  Only the public networks have an
//! explorer; regtest and simnet must supply raw start tips.

use std::time::Duration;

use bitcoin::block::Header;
use bitcoin::consensus::encode;
use hnode_primitives::Network;
use tracing::debug;

use crate::errors::{NetError, NetResult};

const MAINNET_API: &str = "https://blockstream.info/api";
const TESTNET_API: &str = "https://blockstream.info/testnet/api";

/// Default deadline for the whole bootstrap lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ExplorerClient {
    base_url: String,
    client: reqwest::Client,
}

impl ExplorerClient {
    /// A client for the network's public explorer.
    pub fn for_network(network: Network, timeout: Duration) -> NetResult<Self> {
        let base = match network {
            Network::Main => MAINNET_API,
            Network::Test => TESTNET_API,
            other => return Err(NetError::ExplorerUnsupported(other)),
        };
        Ok(Self::new(base.to_string(), timeout))
    }

    /// A client against an explicit esplora endpoint.
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("explorer: build http client");
        Self { base_url, client }
    }

    /// The raw header at a height.
    pub async fn header_at(&self, height: u32) -> NetResult<Header> {
        let hash: String = self
            .get_text(&format!("{}/block-height/{}", self.base_url, height))
            .await?;
        let header_hex = self
            .get_text(&format!("{}/block/{}/header", self.base_url, hash.trim()))
            .await?;
        debug!(%height, hash = %hash.trim(), "fetched bootstrap header");
        decode_header_hex(header_hex.trim())
    }

    /// The anchor pair for a start height: the headers at `height - 1` and
    /// `height`.
    pub async fn start_tip(&self, height: u32) -> NetResult<(Header, Header)> {
        let prev = self.header_at(height - 1).await?;
        let start = self.header_at(height).await?;
        Ok((prev, start))
    }

    async fn get_text(&self, url: &str) -> NetResult<String> {
        let resp = self.client.get(url).send().await?;
        let resp = resp.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// Decodes an 80-byte hex header.
pub fn decode_header_hex(s: &str) -> NetResult<Header> {
    let bytes = hex::decode(s).map_err(|e| NetError::BadPayload(format!("header hex: {e}")))?;
    if bytes.len() != 80 {
        return Err(NetError::BadPayload(format!(
            "header is {} bytes, expected 80",
            bytes.len()
        )));
    }
    encode::deserialize(&bytes).map_err(|e| NetError::BadPayload(format!("header decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_header_hex() {
        // Mainnet genesis header.
        let hex = "0100000000000000000000000000000000000000000000000000000000000000\
                   000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa\
                   4b1e5e4a29ab5f49ffff001d1dac2b7c";
        let header = decode_header_hex(hex).unwrap();
        assert_eq!(
            header.block_hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            decode_header_hex("deadbeef"),
            Err(NetError::BadPayload(_))
        ));
    }

    #[test]
    fn test_explorer_refused_on_local_networks() {
        for net in [Network::Regtest, Network::Simnet] {
            assert!(matches!(
                ExplorerClient::for_network(net, DEFAULT_LOOKUP_TIMEOUT),
                Err(NetError::ExplorerUnsupported(_))
            ));
        }
    }
}
