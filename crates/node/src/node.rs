//! The header node.

use std::sync::Arc;

use bitcoin::block::Header;
use bitcoin::BlockHash;
use hnode_chain::chain::{ChainConfig, WorkingChain};
use hnode_chain::{ChainEvent, ChainObserver};
use hnode_db::HeaderDatabase;
use hnode_index::{HeaderIndexer, StartTip};
use hnode_net::{PeerEvent, PeerOps};
use hnode_primitives::{ChainEntry, NetworkParams};
use hnode_sync::{header_sync_task, DriverConfig, SyncDriver, SyncStatus};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::*;

use crate::errors::NodeError;

/// Query key: a height or a block hash.
#[derive(Copy, Clone, Debug)]
pub enum HeightOrHash {
    Height(u32),
    Hash(BlockHash),
}

impl From<u32> for HeightOrHash {
    fn from(height: u32) -> Self {
        HeightOrHash::Height(height)
    }
}

impl From<BlockHash> for HeightOrHash {
    fn from(hash: BlockHash) -> Self {
        HeightOrHash::Hash(hash)
    }
}

#[derive(Clone, Debug)]
pub struct NodeOptions {
    /// Enforce checkpoint conformance.
    pub checkpoints: bool,

    /// Custom start anchor, already resolved to raw headers.
    pub start: Option<StartTip>,

    /// Sync-driver tuning.
    pub driver: DriverConfig,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            checkpoints: true,
            start: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Forwards chain events to external subscribers, in emission order.
struct BroadcastObserver {
    tx: broadcast::Sender<ChainEvent>,
}

impl ChainObserver for BroadcastObserver {
    fn on_connect(&self, entry: &ChainEntry) -> anyhow::Result<()> {
        let _ = self.tx.send(ChainEvent::Connect(entry.clone()));
        Ok(())
    }

    fn on_disconnect(&self, entry: &ChainEntry) -> anyhow::Result<()> {
        let _ = self.tx.send(ChainEvent::Disconnect(entry.clone()));
        Ok(())
    }

    fn on_reset(&self, tip: &ChainEntry) -> anyhow::Result<()> {
        let _ = self.tx.send(ChainEvent::Reset(tip.clone()));
        Ok(())
    }
}

/// A running (or openable) header node.
///
/// Components open in dependency order: store, working chain, indexer
/// (running startup reconciliation, possibly injecting a start anchor),
/// then the sync driver once a peer manager is wired in.  Close is the
/// reverse.
pub struct HeaderNode<D> {
    params: Arc<NetworkParams>,
    chain: Arc<Mutex<WorkingChain>>,
    indexer: Arc<HeaderIndexer<D>>,
    driver_config: DriverConfig,
    events_tx: broadcast::Sender<ChainEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    sync_status: Mutex<Option<watch::Receiver<SyncStatus>>>,
}

impl<D: HeaderDatabase> HeaderNode<D> {
    /// Opens the node over a store.  Startup reconciliation completes
    /// before this returns; afterwards every query answers from a
    /// consistent store/chain pair.
    pub fn open(
        db: Arc<D>,
        params: NetworkParams,
        options: NodeOptions,
    ) -> Result<Arc<Self>, NodeError> {
        let mut chain_config = ChainConfig::for_params(&params);
        chain_config.checkpoints = options.checkpoints;

        let (indexer, mut chain, params) =
            HeaderIndexer::open(db, params, chain_config, options.start)?;

        let (events_tx, _) = broadcast::channel(1024);
        chain.add_observer(Arc::new(BroadcastObserver {
            tx: events_tx.clone(),
        }));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            network = %params.network,
            tip = chain.height(),
            start = indexer.start_height(),
            "header node open"
        );

        Ok(Arc::new(Self {
            params,
            chain: Arc::new(Mutex::new(chain)),
            indexer,
            driver_config: options.driver,
            events_tx,
            shutdown_tx,
            shutdown_rx,
            sync_task: Mutex::new(None),
            sync_status: Mutex::new(None),
        }))
    }

    /// Wires the node to a peer manager and starts the sync driver.
    pub fn start_sync<P: PeerOps + 'static>(
        &self,
        peers: Arc<P>,
        events: mpsc::Receiver<PeerEvent>,
    ) {
        let driver = SyncDriver::new(
            self.chain.clone(),
            self.indexer.clone(),
            peers,
            self.driver_config.clone(),
        );
        *self.sync_status.lock() = Some(driver.status());
        let handle = tokio::spawn(header_sync_task(driver, events, self.shutdown_rx.clone()));
        *self.sync_task.lock() = Some(handle);
    }

    /// The latest sync-progress snapshot, if the driver is running.
    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.sync_status
            .lock()
            .as_ref()
            .map(|rx| rx.borrow().clone())
    }

    /// Stops the sync driver and flushes any staged writes.
    pub async fn close(&self) -> Result<(), NodeError> {
        let _ = self.shutdown_tx.send(true);
        let task = self.sync_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.indexer.commit_batch()?;
        info!("header node closed");
        Ok(())
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// The configured start height, or 0 when syncing from genesis.
    pub fn start_height(&self) -> u32 {
        self.indexer.start_height()
    }

    /// The store's tip entry.
    pub fn tip(&self) -> Result<ChainEntry, NodeError> {
        let height = self.indexer.tip_height()?;
        self.indexer
            .get_entry(height)?
            .ok_or_else(|| NodeError::Db(hnode_db::DbError::Other("tip row vanished".into())))
    }

    /// Header at a height, served from the store.
    pub fn get_header(&self, height: u32) -> Result<Option<Header>, NodeError> {
        Ok(self.indexer.get_header(height)?)
    }

    /// Entry lookup by height or hash.  Heights answer from the store
    /// (bare rows reconstructed with zero work); hashes answer from the
    /// working chain, which tracks the recent portion.
    pub fn get_entry(&self, key: impl Into<HeightOrHash>) -> Result<Option<ChainEntry>, NodeError> {
        match key.into() {
            HeightOrHash::Height(height) => Ok(self.indexer.get_entry(height)?),
            HeightOrHash::Hash(hash) => Ok(self.chain.lock().get_entry(&hash).cloned()),
        }
    }

    /// Ordered push stream of connect/disconnect/reset events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events_tx.subscribe()
    }

    /// The indexer, for locator computation and store-level tooling.
    pub fn indexer(&self) -> &Arc<HeaderIndexer<D>> {
        &self.indexer
    }

    /// The working chain, shared with the sync driver.
    pub fn chain(&self) -> &Arc<Mutex<WorkingChain>> {
        &self.chain
    }
}
