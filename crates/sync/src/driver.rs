//! The sync driver task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bitcoin::block::Header;
use bitcoin::BlockHash;
use hnode_chain::chain::WorkingChain;
use hnode_chain::{AttachOutcome, ChainError};
use hnode_db::HeaderDatabase;
use hnode_index::HeaderIndexer;
use hnode_net::{GetHeadersMessage, PeerEvent, PeerId, PeerOps};
use hnode_primitives::constants::MAX_HEADERS_PER_MSG;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::*;

use crate::config::DriverConfig;
use crate::errors::SyncError;
use crate::orphans::OrphanPool;
use crate::status::{now_millis, SyncStatus};

/// Housekeeping cadence for deadlines and orphan expiry.
const TICK_INTERVAL_MS: u64 = 500;

/// What one batch ingestion did, decided under the chain lock.
struct Ingest {
    accepted: usize,

    /// Reorgs applied while ingesting.
    reorgs: u64,

    /// Validation failure that stopped the batch, for peer scoring.
    fault: Option<String>,

    /// `(missing parent, orphan root, stashed headers)` when the batch
    /// didn't connect.
    orphan: Option<(BlockHash, BlockHash, Vec<Header>)>,
}

pub struct SyncDriver<D, P> {
    chain: Arc<Mutex<WorkingChain>>,
    indexer: Arc<HeaderIndexer<D>>,
    peers: Arc<P>,
    config: DriverConfig,
    orphans: OrphanPool,

    /// Outstanding `getheaders` deadlines per peer.
    inflight: HashMap<PeerId, Instant>,

    status_tx: watch::Sender<SyncStatus>,
}

impl<D: HeaderDatabase, P: PeerOps> SyncDriver<D, P> {
    pub fn new(
        chain: Arc<Mutex<WorkingChain>>,
        indexer: Arc<HeaderIndexer<D>>,
        peers: Arc<P>,
        config: DriverConfig,
    ) -> Self {
        let orphans = OrphanPool::new(config.max_orphan_rounds);
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            chain,
            indexer,
            peers,
            config,
            orphans,
            inflight: HashMap::new(),
            status_tx,
        }
    }

    /// A receiver over the driver's progress snapshots.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Publishes a fresh progress snapshot.
    fn publish_status(&self, accepted: usize, reorgs: u64) {
        let (tip_height, tip_hash) = {
            let chain = self.chain.lock();
            (chain.height(), *chain.tip().hash())
        };
        let orphans_pending = self.orphans.len();
        self.status_tx.send_modify(|status| {
            status.tip_height = tip_height;
            status.tip_hash = Some(tip_hash);
            status.headers_accepted += accepted as u64;
            status.reorgs += reorgs;
            status.orphans_pending = orphans_pending;
            status.last_update_ms = now_millis();
        });
    }

    pub async fn handle_event(&mut self, event: PeerEvent) -> Result<(), SyncError> {
        match event {
            PeerEvent::Connected(peer) => {
                debug!(%peer, "peer ready, requesting headers");
                self.request_headers(peer, None).await
            }
            PeerEvent::Disconnected(peer) => {
                self.inflight.remove(&peer);
                Ok(())
            }
            PeerEvent::BlockAnnounced(peer, hash) => {
                if self.chain.lock().get_entry(&hash).is_some() {
                    return Ok(());
                }
                debug!(%peer, %hash, "unknown block announced");
                self.request_headers(peer, None).await
            }
            PeerEvent::Headers(peer, headers) => self.handle_headers(peer, headers).await,
        }
    }

    async fn handle_headers(
        &mut self,
        peer: PeerId,
        headers: Vec<Header>,
    ) -> Result<(), SyncError> {
        self.inflight.remove(&peer);
        if headers.is_empty() {
            trace!(%peer, "peer has nothing for us");
            return Ok(());
        }

        let count = headers.len();
        let ingest = self.ingest(peer, headers)?;
        debug!(%peer, %count, accepted = ingest.accepted, "processed headers batch");
        self.publish_status(ingest.accepted, ingest.reorgs);

        if let Some(reason) = ingest.fault {
            self.peers.report_misbehaviour(peer, 100, &reason);
            return Ok(());
        }

        if let Some((parent, root, stash)) = ingest.orphan {
            if self.orphans.insert(parent, stash, peer) {
                debug!(%peer, %root, "chasing orphan root");
                self.request_headers(peer, Some(root)).await?;
            } else {
                warn!(%peer, %root, "orphan root out of rounds, ejected");
            }
            return Ok(());
        }

        if ingest.accepted > 0 {
            self.drain_orphans()?;
        }

        // A full message means the peer has more.
        if count >= MAX_HEADERS_PER_MSG {
            self.request_headers(peer, None).await?;
        }

        Ok(())
    }

    /// Feeds one batch through the working chain and commits the accepted
    /// prefix atomically.  Pure chain work happens under the lock; requests
    /// and scoring are left to the caller.
    fn ingest(&mut self, peer: PeerId, headers: Vec<Header>) -> Result<Ingest, SyncError> {
        let mut result = Ingest {
            accepted: 0,
            reorgs: 0,
            fault: None,
            orphan: None,
        };

        self.indexer.begin_batch();
        {
            let mut chain = self.chain.lock();
            for (idx, header) in headers.iter().enumerate() {
                match chain.add(*header) {
                    Ok(AttachOutcome::Duplicate) => {}
                    Ok(AttachOutcome::Reorged {
                        old_tip, new_tip, ..
                    }) => {
                        result.accepted += 1;
                        result.reorgs += 1;
                        info!(%peer, old = %old_tip.hash(), new = %new_tip.hash(), "peer delivered better branch");
                    }
                    Ok(_) => result.accepted += 1,
                    Err(ChainError::MissingParent { hash, prev }) => {
                        result.orphan = Some((prev, hash, headers[idx..].to_vec()));
                        break;
                    }
                    Err(err) if err.is_peer_fault() => {
                        warn!(%peer, err = %err, "peer sent invalid header");
                        result.fault = Some(err.to_string());
                        break;
                    }
                    Err(err) => {
                        // Fatal.  Keep the accepted prefix; the task dies
                        // with the batch committed at the last good header.
                        self.indexer.commit_batch()?;
                        return Err(err.into());
                    }
                }
            }
        }
        self.indexer.commit_batch()?;
        Ok(result)
    }

    /// Connects any stashed orphans whose ancestry just arrived.
    fn drain_orphans(&mut self) -> Result<(), SyncError> {
        loop {
            let tip = *self.chain.lock().tip().hash();
            let Some(batch) = self.orphans.take_ready(&tip) else {
                return Ok(());
            };

            info!(parent = %tip, count = batch.headers.len(), "connecting stashed orphans");
            let ingest = self.ingest(batch.from, batch.headers)?;
            self.publish_status(ingest.accepted, ingest.reorgs);
            if let Some(reason) = ingest.fault {
                self.peers.report_misbehaviour(batch.from, 100, &reason);
                return Ok(());
            }
            if ingest.orphan.is_some() || ingest.accepted == 0 {
                return Ok(());
            }
        }
    }

    async fn request_headers(
        &mut self,
        peer: PeerId,
        stop: Option<BlockHash>,
    ) -> Result<(), SyncError> {
        let locator = self.indexer.locator()?;
        let msg = GetHeadersMessage::new(locator, stop);
        if let Err(err) = self.peers.send_get_headers(peer, msg).await {
            warn!(%peer, err = %err, "failed to send getheaders");
            return Ok(());
        }
        self.inflight.insert(peer, Instant::now());
        Ok(())
    }

    /// Periodic housekeeping: peer deadlines and orphan expiry.
    pub fn on_tick(&mut self) {
        let now = Instant::now();
        let deadline = Duration::from_millis(self.config.response_timeout_ms as u64);
        let expired: Vec<PeerId> = self
            .inflight
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= deadline)
            .map(|(p, _)| *p)
            .collect();
        for peer in expired {
            warn!(%peer, "peer missed the headers deadline, demoting");
            self.inflight.remove(&peer);
            self.peers.demote(peer);
        }

        let ttl = Duration::from_millis(self.config.orphan_timeout_ms as u64);
        for root in self.orphans.expire(ttl) {
            debug!(parent = %root, "expired stale orphans");
        }
        let orphans_pending = self.orphans.len();
        self.status_tx
            .send_modify(|status| status.orphans_pending = orphans_pending);
    }
}

/// Runs the driver until the event channel closes or shutdown fires.
pub async fn header_sync_task<D: HeaderDatabase, P: PeerOps>(
    driver: SyncDriver<D, P>,
    events: mpsc::Receiver<PeerEvent>,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = do_sync_task(driver, events, shutdown).await {
        error!(err = %e, "sync task exited");
    }
}

async fn do_sync_task<D: HeaderDatabase, P: PeerOps>(
    mut driver: SyncDriver<D, P>,
    mut events: mpsc::Receiver<PeerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError> {
    info!("started header sync task");
    let mut tick = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("sync task shutting down");
                    break;
                }
            }
            event = events.recv() => match event {
                Some(event) => driver.handle_event(event).await?,
                None => {
                    info!("peer event channel closed");
                    break;
                }
            },
            _ = tick.tick() => driver.on_tick(),
        }
    }

    Ok(())
}
