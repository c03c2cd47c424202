//! The query RPC surface.  Thin by design: lookups only, no control plane.

use std::net::SocketAddr;
use std::sync::Arc;

use bitcoin::block::Header;
use hnode_config::RpcConfig;
use hnode_db::HeaderDatabase;
use hnode_node::HeaderNode;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use tracing::*;

/// A header as the RPC shows it: hashes in display (reversed) order,
/// confirmations relative to the current tip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeaderView {
    pub hash: String,
    pub height: u32,
    pub version: i32,
    pub prev_block: String,
    pub merkle_root: String,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub confirmations: u64,
}

impl HeaderView {
    fn new(header: &Header, height: u32, tip_height: u32) -> Self {
        Self {
            hash: header.block_hash().to_string(),
            height,
            version: header.version.to_consensus(),
            prev_block: header.prev_blockhash.to_string(),
            merkle_root: header.merkle_root.to_string(),
            time: header.time,
            bits: header.bits.to_consensus(),
            nonce: header.nonce,
            confirmations: (tip_height - height + 1) as u64,
        }
    }
}

/// Sync progress as the RPC shows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncStatusView {
    pub tip_height: u32,
    pub tip_hash: Option<String>,
    pub headers_accepted: u64,
    pub reorgs: u64,
    pub orphans_pending: usize,
    pub last_update_ms: u64,
}

#[rpc(server, namespace = "hnode")]
pub trait HnodeApi {
    /// Header at a height, or null when the node doesn't have it.
    #[method(name = "getHeaderByHeight")]
    async fn get_header_by_height(&self, height: u32) -> RpcResult<Option<HeaderView>>;

    /// The current tip.
    #[method(name = "getTip")]
    async fn get_tip(&self) -> RpcResult<HeaderView>;

    /// The configured start height (0 when syncing from genesis).
    #[method(name = "getStartHeight")]
    async fn get_start_height(&self) -> RpcResult<u32>;

    /// The header at the configured start height.
    #[method(name = "getStartHeader")]
    async fn get_start_header(&self) -> RpcResult<Option<HeaderView>>;

    /// Sync progress, or null when no sync driver is running.
    #[method(name = "getSyncStatus")]
    async fn get_sync_status(&self) -> RpcResult<Option<SyncStatusView>>;
}

pub struct RpcServerImpl<D> {
    node: Arc<HeaderNode<D>>,
}

impl<D> RpcServerImpl<D> {
    pub fn new(node: Arc<HeaderNode<D>>) -> Self {
        Self { node }
    }
}

fn internal_error(err: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32000, err.to_string(), None::<()>)
}

#[async_trait]
impl<D: HeaderDatabase> HnodeApiServer for RpcServerImpl<D> {
    async fn get_header_by_height(&self, height: u32) -> RpcResult<Option<HeaderView>> {
        let tip = self.node.tip().map_err(internal_error)?;
        let header = self.node.get_header(height).map_err(internal_error)?;
        Ok(header.map(|h| HeaderView::new(&h, height, tip.height())))
    }

    async fn get_tip(&self) -> RpcResult<HeaderView> {
        let tip = self.node.tip().map_err(internal_error)?;
        Ok(HeaderView::new(tip.header(), tip.height(), tip.height()))
    }

    async fn get_start_height(&self) -> RpcResult<u32> {
        Ok(self.node.start_height())
    }

    async fn get_start_header(&self) -> RpcResult<Option<HeaderView>> {
        let start = self.node.start_height();
        self.get_header_by_height(start).await
    }

    async fn get_sync_status(&self) -> RpcResult<Option<SyncStatusView>> {
        Ok(self.node.sync_status().map(|s| SyncStatusView {
            tip_height: s.tip_height,
            tip_hash: s.tip_hash.map(|h| h.to_string()),
            headers_accepted: s.headers_accepted,
            reorgs: s.reorgs,
            orphans_pending: s.orphans_pending,
            last_update_ms: s.last_update_ms,
        }))
    }
}

/// Binds and starts the RPC server.
pub async fn start<D: HeaderDatabase>(
    node: Arc<HeaderNode<D>>,
    config: &RpcConfig,
) -> anyhow::Result<ServerHandle> {
    let addr: SocketAddr = format!("{}:{}", config.rpc_host, config.rpc_port).parse()?;
    let server = Server::builder().build(addr).await?;
    let handle = server.start(RpcServerImpl::new(node).into_rpc());
    info!(%addr, "rpc server started");
    Ok(handle)
}
