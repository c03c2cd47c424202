//! A trusted-bitcoind stand-in for the peer manager.
//!
//! Answers the driver's `getheaders` from a local node's RPC and announces
//! new tips by polling.  Misbehaviour reports against a node we trust are
//! just logged.

use std::time::Duration;

use async_trait::async_trait;
use hnode_common::retry::{retry_with_backoff, ExponentialBackoff, DEFAULT_RPC_MAX_RETRIES};
use hnode_net::{
    BitcoindClient, GetHeadersMessage, NetResult, PeerEvent, PeerId, PeerOps,
};
use hnode_primitives::constants::MAX_HEADERS_PER_MSG;
use tokio::sync::{mpsc, watch};
use tracing::*;

/// The one peer id this source ever uses.
pub const LOCAL_PEER: PeerId = PeerId(0);

#[derive(Clone)]
pub struct BitcoindPeerSource {
    client: BitcoindClient,
    events: mpsc::Sender<PeerEvent>,
}

impl BitcoindPeerSource {
    pub fn new(client: BitcoindClient, events: mpsc::Sender<PeerEvent>) -> Self {
        Self { client, events }
    }

    /// Announces the trusted node as a peer, then polls it for new tips.
    pub async fn poll_task(self, poll_interval_ms: u32, mut shutdown: watch::Receiver<bool>) {
        let _ = self.events.send(PeerEvent::Connected(LOCAL_PEER)).await;

        let interval = Duration::from_millis(poll_interval_ms as u64);
        let mut last_height: Option<u64> = None;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let height = match retry_with_backoff(
                "getblockcount",
                DEFAULT_RPC_MAX_RETRIES,
                &ExponentialBackoff::default(),
                || self.client.get_block_count(),
            )
            .await
            {
                Ok(h) => h,
                Err(err) => {
                    warn!(err = %err, "trusted node unreachable");
                    continue;
                }
            };

            if last_height == Some(height) {
                continue;
            }
            last_height = Some(height);

            match self.client.get_block_hash(height).await {
                Ok(hash) => {
                    debug!(%height, %hash, "trusted node has a new tip");
                    let _ = self
                        .events
                        .send(PeerEvent::BlockAnnounced(LOCAL_PEER, hash))
                        .await;
                }
                Err(err) => warn!(err = %err, "failed to fetch new tip hash"),
            }
        }

        info!("bitcoind poll task stopped");
    }

    /// Serves one `getheaders`: find the fork point among the locator
    /// hashes, then stream headers from there.
    async fn serve_headers(&self, peer: PeerId, msg: GetHeadersMessage) -> anyhow::Result<()> {
        let best = self.client.get_block_count().await?;

        let mut start = 0u64;
        for hash in &msg.locator {
            match self.client.get_block_header_info(hash).await {
                // Negative confirmations mean a stale branch.
                Ok(info) if info.confirmations >= 0 => {
                    start = info.height as u64 + 1;
                    break;
                }
                Ok(_) => continue,
                // Unknown to the node; try the next, sparser entry.
                Err(_) => continue,
            }
        }

        let mut headers = Vec::new();
        let mut height = start;
        while height <= best && headers.len() < MAX_HEADERS_PER_MSG {
            let header = self.client.get_block_header_at(height).await?;
            let done = !msg.wants_everything() && header.block_hash() == msg.stop;
            headers.push(header);
            if done {
                break;
            }
            height += 1;
        }

        debug!(count = headers.len(), from = start, "serving headers from trusted node");
        let _ = self.events.send(PeerEvent::Headers(peer, headers)).await;
        Ok(())
    }
}

#[async_trait]
impl PeerOps for BitcoindPeerSource {
    async fn send_get_headers(&self, peer: PeerId, msg: GetHeadersMessage) -> NetResult<()> {
        // Serve from a separate task so the driver is free to drain the
        // event channel we push into.
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.serve_headers(peer, msg).await {
                warn!(err = %err, "failed to serve getheaders from trusted node");
            }
        });
        Ok(())
    }

    fn report_misbehaviour(&self, peer: PeerId, score: u32, reason: &str) {
        // A trusted node sending bad headers is a configuration problem,
        // not something to ban.
        error!(%peer, %score, %reason, "trusted node served invalid headers");
    }

    fn demote(&self, peer: PeerId) {
        warn!(%peer, "trusted node missed a deadline");
    }
}
