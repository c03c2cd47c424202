//! The header indexer.
//!
//! Owns the header store.  As a [`ChainObserver`] it mirrors the working
//! chain's accepted tip into the store; at startup it rebuilds the working
//! chain from the store, injecting the custom start anchor when one is
//! configured.

use std::sync::Arc;

use bitcoin::block::Header;
use bitcoin::BlockHash;
use hnode_chain::chain::{ChainConfig, WorkingChain};
use hnode_chain::ChainObserver;
use hnode_common::retry::{retry_with_backoff_blocking, ExponentialBackoff};
use hnode_db::{DbResult, HeaderDatabase, StoreFlags, StoreOp, StoredBlock};
use hnode_primitives::constants::{MEDIAN_TIME_SPAN, STORE_SCHEMA_VERSION};
use hnode_primitives::{ChainEntry, NetworkParams};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bootstrap::{validate_start_height, StartTip};
use crate::errors::IndexError;
use crate::locator;

/// Transient store failures get this many more attempts before the node
/// gives up.
const STORE_WRITE_RETRIES: u16 = 3;

#[derive(Default)]
struct PendingBatch {
    ops: Vec<StoreOp>,
    open: bool,
}

/// Mirrors chain events into the store and answers height-keyed queries.
pub struct HeaderIndexer<D> {
    db: Arc<D>,
    params: Arc<NetworkParams>,

    /// Lowest usable height: the start marker, or 0 from genesis.
    floor: u32,

    /// Writes staged between `begin_batch` and `commit_batch`.  Outside a
    /// batch every event commits immediately.
    pending: Mutex<PendingBatch>,
}

impl<D: HeaderDatabase> HeaderIndexer<D> {
    /// Opens the indexer over a store and rebuilds the working chain from
    /// it.  This is the startup reconciliation path: it validates the store
    /// metadata, resolves the custom start (store marker authoritative),
    /// replays persisted rows into a fresh chain, and returns the effective
    /// params with the start anchor folded in.
    ///
    /// Runs to completion before the node is considered open; nothing else
    /// may touch the chain meanwhile.
    pub fn open(
        db: Arc<D>,
        params: NetworkParams,
        chain_config: ChainConfig,
        start: Option<StartTip>,
    ) -> Result<(Arc<Self>, WorkingChain, Arc<NetworkParams>), IndexError> {
        match db.get_version()? {
            None => db.put_version(STORE_SCHEMA_VERSION)?,
            Some(found) if found != STORE_SCHEMA_VERSION => {
                return Err(IndexError::SchemaVersion {
                    found,
                    expected: STORE_SCHEMA_VERSION,
                });
            }
            Some(_) => {}
        }

        match db.get_flags()? {
            None => db.put_flags(&StoreFlags {
                network: params.network,
                fast_sync: start.is_some(),
            })?,
            Some(flags) if flags.network != params.network => {
                return Err(IndexError::NetworkMismatch {
                    stored: flags.network,
                    configured: params.network,
                });
            }
            Some(_) => {}
        }

        let stored_marker = db.get_start_marker()?;
        let floor = match (stored_marker, &start) {
            (Some(stored), Some(tip)) if tip.height != stored => {
                return Err(IndexError::StartMarkerMismatch {
                    configured: tip.height,
                    stored,
                });
            }
            (Some(stored), configured) => {
                if stored == 0 {
                    return Err(IndexError::Corrupt("start marker is zero".to_string()));
                }
                for height in [stored - 1, stored] {
                    if db.get_block(height)?.is_none() {
                        return Err(IndexError::Corrupt(format!(
                            "start marker {stored} set but anchor row {height} missing"
                        )));
                    }
                }
                // Same height but different headers is still a config error.
                if let Some(tip) = configured {
                    let stored_hash = db.get_hash(stored)?.ok_or(IndexError::MissingRow(stored))?;
                    if tip.start.block_hash() != stored_hash {
                        return Err(IndexError::BadStartTip(format!(
                            "configured start header at {stored} doesn't match the stored anchor"
                        )));
                    }
                }
                stored
            }
            (None, Some(tip)) => {
                if db.chain_tip()?.is_some() {
                    // The store already syncs from genesis; a configured
                    // start can't rewrite history.
                    return Err(IndexError::StartMarkerMismatch {
                        configured: tip.height,
                        stored: 0,
                    });
                }
                Self::write_start_anchor(&db, &params, tip)?
            }
            (None, None) => 0,
        };

        // Fold the anchor into the checkpoint map so the validator treats
        // the injected block as fixed ancestry.
        let params = if floor > 0 {
            let hash = db.get_hash(floor)?.ok_or(IndexError::MissingRow(floor))?;
            params.anchor_at(floor, hash)
        } else {
            params
        };
        let params = Arc::new(params);

        // A fresh genesis-sync store gets its genesis row.
        if db.chain_tip()?.is_none() {
            let genesis = ChainEntry::genesis(&params);
            db.apply_ops(&[StoreOp::PutBlock(0, StoredBlock::from_entry(&genesis, true))])?;
        }

        let tip_height = db
            .chain_tip()?
            .ok_or_else(|| IndexError::Corrupt("store empty after init".to_string()))?;

        let indexer = Arc::new(Self {
            db,
            params: params.clone(),
            floor,
            pending: Mutex::new(PendingBatch::default()),
        });
        let mut chain = indexer.rebuild_chain(chain_config, tip_height)?;
        chain.add_observer(indexer.clone());

        Ok((indexer, chain, params))
    }

    /// Validates and persists a fresh custom start anchor.  Returns the
    /// start height.
    fn write_start_anchor(
        db: &Arc<D>,
        params: &NetworkParams,
        tip: &StartTip,
    ) -> Result<u32, IndexError> {
        validate_start_height(tip.height, params)?;
        let s = tip.height;

        // The historical point once the anchor lowers the last checkpoint.
        let hp = s - (s % params.retarget_interval);

        let prev_entry = ChainEntry::with_zero_work(tip.prev, s - 1);
        let start_entry = ChainEntry::from_parent(&prev_entry, tip.start);
        db.apply_ops(&[
            StoreOp::PutBlock(s - 1, StoredBlock::from_entry(&prev_entry, s - 1 <= hp)),
            StoreOp::PutBlock(s, StoredBlock::from_entry(&start_entry, s <= hp)),
            StoreOp::SetStartMarker(s),
        ])?;
        info!(start = s, hash = %start_entry.hash(), "persisted custom start anchor");
        Ok(s)
    }

    /// Replays store rows into a fresh working chain.
    ///
    /// Rows at or below the historical point are bare and carry no work, so
    /// replay proper starts at the first non-historical height (or the
    /// floor, when the whole store is historical).  Below that the chain is
    /// preloaded with enough trusted ancestors for the median-time-past and
    /// retarget walks.
    fn rebuild_chain(
        &self,
        chain_config: ChainConfig,
        tip_height: u32,
    ) -> Result<WorkingChain, IndexError> {
        let hp = self.params.historical_point();

        let replay_from = if tip_height <= hp {
            self.floor.max(1)
        } else if self.params.last_checkpoint() == 0 {
            1
        } else {
            hp + 1
        };

        let ctx_depth = self.params.retarget_interval.max(MEDIAN_TIME_SPAN as u32);
        let lowest_row = if self.floor > 0 { self.floor - 1 } else { 0 };
        let root_height = lowest_row
            .max(replay_from.saturating_sub(ctx_depth + 1))
            .min(tip_height);

        let root = self.entry_from_store(root_height)?;
        let mut chain =
            WorkingChain::with_root(self.params.clone(), chain_config, root, self.floor);
        for height in (root_height + 1)..=tip_height {
            chain.attach_trusted(self.entry_from_store(height)?)?;
        }

        info!(
            tip = tip_height,
            floor = self.floor,
            replayed_from = root_height,
            "rebuilt working chain from store"
        );
        Ok(chain)
    }

    fn entry_from_store(&self, height: u32) -> Result<ChainEntry, IndexError> {
        let row = self
            .db
            .get_block(height)?
            .ok_or(IndexError::MissingRow(height))?;
        Ok(row.to_entry(height)?)
    }

    fn stage(&self, op: StoreOp) -> DbResult<()> {
        let mut pending = self.pending.lock();
        pending.ops.push(op);
        if !pending.open {
            let ops = std::mem::take(&mut pending.ops);
            self.write_ops(&ops)?;
        }
        Ok(())
    }

    /// One atomic store write, with a short retry budget for transient I/O
    /// failures.  Exhausting it is fatal to the caller.
    fn write_ops(&self, ops: &[StoreOp]) -> DbResult<()> {
        retry_with_backoff_blocking(
            "header_store_write",
            STORE_WRITE_RETRIES,
            &ExponentialBackoff::new(100, 15, 10),
            || self.db.apply_ops(ops),
        )
    }

    /// Starts buffering writes.  Everything staged until `commit_batch`
    /// lands in one atomic store write.
    pub fn begin_batch(&self) {
        self.pending.lock().open = true;
    }

    /// Commits the buffered writes.  A crash before this leaves the store
    /// at the previous batch boundary.
    pub fn commit_batch(&self) -> DbResult<()> {
        let mut pending = self.pending.lock();
        let ops = std::mem::take(&mut pending.ops);
        pending.open = false;
        drop(pending);
        if !ops.is_empty() {
            self.write_ops(&ops)?;
        }
        Ok(())
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    /// The effective floor: the custom start height, or 0.
    pub fn start_height(&self) -> u32 {
        self.floor
    }

    /// The store's tip height.
    pub fn tip_height(&self) -> Result<u32, IndexError> {
        self.db
            .chain_tip()?
            .ok_or_else(|| IndexError::Corrupt("store has no rows".to_string()))
    }

    pub fn get_header(&self, height: u32) -> Result<Option<Header>, IndexError> {
        match self.db.get_block(height)? {
            Some(row) => Ok(Some(row.header(height)?)),
            None => Ok(None),
        }
    }

    /// The entry at a height.  Bare rows come back with zero work, which is
    /// fine below the historical point where work is never consulted.
    pub fn get_entry(&self, height: u32) -> Result<Option<ChainEntry>, IndexError> {
        match self.db.get_block(height)? {
            Some(row) => Ok(Some(row.to_entry(height)?)),
            None => Ok(None),
        }
    }

    pub fn get_hash(&self, height: u32) -> Result<Option<BlockHash>, IndexError> {
        Ok(self.db.get_hash(height)?)
    }

    /// Locator for the current store tip, floored at the start height.
    pub fn locator(&self) -> Result<Vec<BlockHash>, IndexError> {
        let tip = self.tip_height()?;
        locator::chain_locator(&*self.db, tip, self.floor)
    }

    /// Rewinds the store to `height`, refusing to cross the start marker.
    pub fn reset_to_height(&self, height: u32) -> Result<(), IndexError> {
        if self.floor > 0 && height < self.floor {
            return Err(IndexError::ResetBelowStart {
                requested: height,
                start: self.floor,
            });
        }
        self.db.prune_above(height)?;
        info!(%height, "store rewound");
        Ok(())
    }
}

impl<D: HeaderDatabase> ChainObserver for HeaderIndexer<D> {
    fn on_connect(&self, entry: &ChainEntry) -> anyhow::Result<()> {
        let historical = entry.height() <= self.params.historical_point();
        self.stage(StoreOp::PutBlock(
            entry.height(),
            StoredBlock::from_entry(entry, historical),
        ))?;
        Ok(())
    }

    fn on_disconnect(&self, entry: &ChainEntry) -> anyhow::Result<()> {
        self.stage(StoreOp::DelBlock(entry.height()))?;
        Ok(())
    }

    fn on_reset(&self, tip: &ChainEntry) -> anyhow::Result<()> {
        // The store already reflects accepted history; only in-memory
        // bookkeeping restarts.
        debug!(height = tip.height(), "chain reset observed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hnode_db::{HeaderProvider, MemHeaderDb};
    use hnode_test_utils::{checkpoint_params, quick_params, HeaderGen};

    use super::*;

    fn chain_config() -> ChainConfig {
        ChainConfig {
            checkpoints: true,
            prune_depth: 64,
        }
    }

    /// 75 blocks over a network with interval 25 and a checkpoint at 62,
    /// historical point 50.
    fn mined_75() -> (HeaderGen, NetworkParams) {
        let mut gen = HeaderGen::new(quick_params(25));
        gen.mine(75);
        let params = checkpoint_params(&gen, &[62]);
        (gen, params)
    }

    #[test]
    fn test_open_fresh_genesis() {
        let db = Arc::new(MemHeaderDb::new());
        let (indexer, chain, _params) =
            HeaderIndexer::open(db.clone(), quick_params(25), chain_config(), None).unwrap();

        assert_eq!(chain.height(), 0);
        assert_eq!(indexer.start_height(), 0);
        assert_eq!(indexer.tip_height().unwrap(), 0);
        assert!(db.get_block(0).unwrap().unwrap().is_historical());
        assert_eq!(db.get_version().unwrap(), Some(STORE_SCHEMA_VERSION));
        assert!(db.get_flags().unwrap().is_some());
    }

    #[test]
    fn test_connect_events_split_at_historical_point() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let (indexer, mut chain, _) =
            HeaderIndexer::open(db.clone(), params, chain_config(), None).unwrap();

        for height in 1..=75u32 {
            chain.add(gen.header_at(height)).unwrap();
        }

        assert_eq!(indexer.tip_height().unwrap(), 75);
        for height in 0..=75u32 {
            let row = db.get_block(height).unwrap().unwrap();
            assert_eq!(row.is_historical(), height <= 50, "wrong row kind at {height}");
            assert_eq!(row.block_hash(), gen.hash_at(height));
            assert_eq!(db.get_hash(height).unwrap(), Some(gen.hash_at(height)));
        }

        // Recent rows revive with their true cumulative work.
        let revived = indexer.get_entry(75).unwrap().unwrap();
        assert_eq!(revived.chainwork(), gen.entry_at(75).chainwork());
    }

    #[test]
    fn test_restart_rebuilds_chain() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        {
            let (_indexer, mut chain, _) =
                HeaderIndexer::open(db.clone(), params.clone(), chain_config(), None).unwrap();
            for height in 1..=75u32 {
                chain.add(gen.header_at(height)).unwrap();
            }
        }

        // Reopen over the same rows: the chain comes back without a peer.
        let (indexer, chain, _) =
            HeaderIndexer::open(db.clone(), params, chain_config(), None).unwrap();
        assert_eq!(chain.height(), 75);
        assert_eq!(chain.tip().hash(), gen.entry_at(75).hash());
        assert_eq!(chain.tip().chainwork(), gen.entry_at(75).chainwork());

        for height in 0..=75u32 {
            assert_eq!(
                indexer.get_header(height).unwrap().unwrap().block_hash(),
                gen.hash_at(height)
            );
        }

        // And the rebuilt chain keeps extending.
        let mut gen2 = gen.clone();
        gen2.mine(1);
        let mut chain = chain;
        chain.add(gen2.header_at(76)).unwrap();
        assert_eq!(indexer.tip_height().unwrap(), 76);
    }

    #[test]
    fn test_batched_writes_land_on_commit() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let (indexer, mut chain, _) =
            HeaderIndexer::open(db.clone(), params, chain_config(), None).unwrap();

        indexer.begin_batch();
        for height in 1..=10u32 {
            chain.add(gen.header_at(height)).unwrap();
        }
        // Staged but not yet visible.
        assert_eq!(indexer.tip_height().unwrap(), 0);

        indexer.commit_batch().unwrap();
        assert_eq!(indexer.tip_height().unwrap(), 10);
    }

    #[test]
    fn test_reorg_rewrites_rows() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let (indexer, mut chain, _) =
            HeaderIndexer::open(db.clone(), params, chain_config(), None).unwrap();

        for height in 1..=75u32 {
            chain.add(gen.header_at(height)).unwrap();
        }

        let mut fork = gen.fork_at(72);
        fork.mine(5);
        for height in 73..=77u32 {
            chain.add(fork.header_at(height)).unwrap();
        }

        assert_eq!(indexer.tip_height().unwrap(), 77);
        for height in 73..=77u32 {
            assert_eq!(
                indexer.get_hash(height).unwrap(),
                Some(fork.hash_at(height)),
                "store kept the losing branch at {height}"
            );
        }
    }

    /// Invariant: after any sequence of connects and disconnects, every
    /// stored row's hash is the next row's prev hash.
    #[test]
    fn test_contiguity_after_fork_storm() {
        let mut gen = HeaderGen::new(quick_params(25));
        gen.mine(30);
        let db = Arc::new(MemHeaderDb::new());
        let (indexer, mut chain, _) =
            HeaderIndexer::open(db.clone(), gen.params().clone(), chain_config(), None).unwrap();

        for height in 1..=30u32 {
            chain.add(gen.header_at(height)).unwrap();
        }

        // Repeated competing branches, each overtaking the last.
        let mut cur = gen;
        for fork_depth in [27u32, 24, 28] {
            let mut fork = cur.fork_at(fork_depth);
            fork.mine(cur.height() - fork_depth + 1);
            for height in (fork_depth + 1)..=fork.height() {
                chain.add(fork.header_at(height)).unwrap();
            }
            cur = fork;
        }

        let tip = indexer.tip_height().unwrap();
        assert_eq!(tip, cur.height());
        let mut prev_hash = db.get_block(0).unwrap().unwrap().block_hash();
        for height in 1..=tip {
            let row = db.get_block(height).unwrap().unwrap();
            let header = row.header(height).unwrap();
            assert_eq!(
                header.prev_blockhash, prev_hash,
                "contiguity broken at {height}"
            );
            prev_hash = row.block_hash();
            assert_eq!(row.block_hash(), cur.hash_at(height));
        }
        assert!(db.get_block(tip + 1).unwrap().is_none());
    }

    #[test]
    fn test_custom_start_bootstrap() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let start = StartTip::new(gen.header_at(49), gen.header_at(50), 50).unwrap();

        let (indexer, chain, eff_params) =
            HeaderIndexer::open(db.clone(), params, chain_config(), Some(start)).unwrap();

        assert_eq!(db.get_start_marker().unwrap(), Some(50));
        assert_eq!(indexer.start_height(), 50);
        assert_eq!(chain.height(), 50);
        assert_eq!(chain.floor(), 50);

        assert!(indexer.get_header(49).unwrap().is_some());
        assert!(indexer.get_header(50).unwrap().is_some());
        assert!(indexer.get_header(48).unwrap().is_none());

        // The anchor became the effective last checkpoint.
        assert_eq!(eff_params.last_checkpoint(), 50);
        assert_eq!(eff_params.checkpoint_at(50), Some(&gen.hash_at(50)));

        let locator = indexer.locator().unwrap();
        assert_eq!(locator, vec![gen.hash_at(50)]);
    }

    #[test]
    fn test_custom_start_syncs_and_restarts() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let start = StartTip::new(gen.header_at(49), gen.header_at(50), 50).unwrap();

        {
            let (_indexer, mut chain, _) =
                HeaderIndexer::open(db.clone(), params.clone(), chain_config(), Some(start))
                    .unwrap();
            for height in 51..=75u32 {
                chain.add(gen.header_at(height)).unwrap();
            }
            assert_eq!(chain.height(), 75);
        }

        // Restart resolves the marker from the store alone.
        let (indexer, chain, _) =
            HeaderIndexer::open(db.clone(), params, chain_config(), None).unwrap();
        assert_eq!(chain.height(), 75);
        assert_eq!(chain.floor(), 50);
        assert_eq!(indexer.start_height(), 50);
        assert_eq!(chain.tip().hash(), gen.entry_at(75).hash());
        assert!(indexer.get_header(30).unwrap().is_none());
    }

    #[test]
    fn test_invalid_start_height_refused() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let start = StartTip::new(gen.header_at(54), gen.header_at(55), 55).unwrap();

        let err = HeaderIndexer::open(db, params, chain_config(), Some(start)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("retarget"));
    }

    #[test]
    fn test_start_marker_mismatch_fatal() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let start = StartTip::new(gen.header_at(49), gen.header_at(50), 50).unwrap();
        drop(
            HeaderIndexer::open(db.clone(), params.clone(), chain_config(), Some(start)).unwrap(),
        );

        let other = StartTip::new(gen.header_at(24), gen.header_at(25), 25).unwrap();
        let err =
            HeaderIndexer::open(db, params, chain_config(), Some(other)).unwrap_err();
        assert!(matches!(
            err,
            IndexError::StartMarkerMismatch {
                configured: 25,
                stored: 50
            }
        ));
    }

    #[test]
    fn test_reset_below_start_refused() {
        let (gen, params) = mined_75();
        let db = Arc::new(MemHeaderDb::new());
        let start = StartTip::new(gen.header_at(49), gen.header_at(50), 50).unwrap();
        let (indexer, _chain, _) =
            HeaderIndexer::open(db, params, chain_config(), Some(start)).unwrap();

        let err = indexer.reset_to_height(30).unwrap_err();
        assert!(matches!(
            err,
            IndexError::ResetBelowStart {
                requested: 30,
                start: 50
            }
        ));

        indexer.reset_to_height(50).unwrap();
        assert_eq!(indexer.tip_height().unwrap(), 50);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let db = Arc::new(MemHeaderDb::new());
        use hnode_db::HeaderStore;
        db.put_version(99).unwrap();

        let err =
            HeaderIndexer::open(db, quick_params(25), chain_config(), None).unwrap_err();
        assert!(matches!(err, IndexError::SchemaVersion { found: 99, .. }));
    }

    #[test]
    fn test_network_mismatch() {
        let db = Arc::new(MemHeaderDb::new());
        drop(HeaderIndexer::open(db.clone(), quick_params(25), chain_config(), None).unwrap());

        let err = HeaderIndexer::open(
            db,
            hnode_primitives::NetworkParams::simnet(),
            chain_config(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::NetworkMismatch { .. }));
    }
}
