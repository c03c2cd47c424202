//! The working chain: the in-memory tree of recent headers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bitcoin::block::Header;
use bitcoin::BlockHash;
use hnode_primitives::{ChainEntry, NetworkParams};
use tracing::{debug, info};

use crate::errors::{ChainError, ValidatorError};
use crate::events::ChainObserver;
use crate::validator::{self, ChainContext};

/// Tuning knobs for the working chain.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    /// Whether checkpoint conformance is enforced.
    pub checkpoints: bool,

    /// Entries deeper than this below the tip are dropped from memory.
    /// Always covers the ancestry contextual validation walks.
    pub prune_depth: u32,
}

impl ChainConfig {
    pub fn for_params(params: &NetworkParams) -> Self {
        Self {
            checkpoints: true,
            prune_depth: (params.retarget_interval * 2).max(64),
        }
    }
}

/// What happened to a header handed to [`WorkingChain::add`].
#[derive(Clone, Debug)]
pub enum AttachOutcome {
    /// Already known; nothing changed.
    Duplicate,

    /// Extended the main tip.
    Extended(ChainEntry),

    /// Attached to a side branch that hasn't overtaken the main chain.
    SideBranch(ChainEntry),

    /// A side branch overtook the main chain by cumulative work.
    Reorged {
        old_tip: ChainEntry,
        new_tip: ChainEntry,
        forked_at: u32,
    },
}

/// In-memory, non-persistent view of the recent chain.
///
/// Tracks the main chain by height plus any competing branches by hash, and
/// resolves between them by cumulative work.  Observers are notified
/// synchronously, in acceptance order, with every disconnect of a reorg
/// delivered before the first connect.
pub struct WorkingChain {
    params: Arc<NetworkParams>,
    config: ChainConfig,

    /// Every retained entry, main chain and side branches alike.
    entries: HashMap<BlockHash, ChainEntry>,

    /// Height to hash, main chain only.
    main: BTreeMap<u32, BlockHash>,

    tip: BlockHash,

    /// Lowest height queries will answer for: the custom start height, or 0.
    floor: u32,

    observers: Vec<Arc<dyn ChainObserver>>,
}

impl ChainContext for WorkingChain {
    fn entry_by_hash(&self, hash: &BlockHash) -> Option<&ChainEntry> {
        self.entries.get(hash)
    }
}

impl WorkingChain {
    /// A chain rooted at an arbitrary trusted entry.  The root is usually a
    /// store row from a previous run or an injected start anchor.
    pub fn with_root(
        params: Arc<NetworkParams>,
        config: ChainConfig,
        root: ChainEntry,
        floor: u32,
    ) -> Self {
        let mut entries = HashMap::new();
        let mut main = BTreeMap::new();
        let tip = *root.hash();
        main.insert(root.height(), tip);
        entries.insert(tip, root);
        Self {
            params,
            config,
            entries,
            main,
            tip,
            floor,
            observers: Vec::new(),
        }
    }

    /// A fresh chain rooted at genesis.
    pub fn new_genesis(params: Arc<NetworkParams>, config: ChainConfig) -> Self {
        let genesis = ChainEntry::genesis(&params);
        Self::with_root(params, config, genesis, 0)
    }

    /// Registers an observer.  Delivery order follows registration order.
    pub fn add_observer(&mut self, observer: Arc<dyn ChainObserver>) {
        self.observers.push(observer);
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn floor(&self) -> u32 {
        self.floor
    }

    /// The current best entry.
    pub fn tip(&self) -> &ChainEntry {
        self.entries.get(&self.tip).expect("chain: tip entry present")
    }

    pub fn height(&self) -> u32 {
        self.tip().height()
    }

    /// Entry lookup by hash; hidden below the floor.
    pub fn get_entry(&self, hash: &BlockHash) -> Option<&ChainEntry> {
        self.entries.get(hash).filter(|e| e.height() >= self.floor)
    }

    /// Main-chain entry at a height; hidden below the floor.
    pub fn get_entry_by_height(&self, height: u32) -> Option<&ChainEntry> {
        if height < self.floor {
            return None;
        }
        self.main.get(&height).and_then(|h| self.entries.get(h))
    }

    pub fn is_main_chain(&self, entry: &ChainEntry) -> bool {
        self.main.get(&entry.height()) == Some(entry.hash())
    }

    /// Validates and attaches one header.
    ///
    /// Extends the tip, grows a side branch, or triggers a reorg when a
    /// branch's cumulative work overtakes the main chain.
    pub fn add(&mut self, header: Header) -> Result<AttachOutcome, ChainError> {
        let hash = header.block_hash();
        if self.entries.contains_key(&hash) {
            debug!(%hash, "ignoring duplicate header");
            return Ok(AttachOutcome::Duplicate);
        }

        let Some(prev) = self.entries.get(&header.prev_blockhash).cloned() else {
            return Err(ChainError::MissingParent {
                hash,
                prev: header.prev_blockhash,
            });
        };

        validator::check_header(&header, &self.params)
            .map_err(|kind| ChainError::Invalid { hash, kind })?;
        let entry = validator::contextual_check(
            &prev,
            &header,
            self,
            &self.params,
            self.config.checkpoints,
        )
        .map_err(|e| match e {
            ValidatorError::Invalid(kind) => ChainError::Invalid { hash, kind },
            ValidatorError::MissingAncestor(height) => ChainError::InvariantViolation(format!(
                "missing ancestor at height {height} while validating {hash}"
            )),
        })?;

        self.entries.insert(hash, entry.clone());

        if *prev.hash() == self.tip {
            self.extend_tip(&entry)?;
            return Ok(AttachOutcome::Extended(entry));
        }

        if entry.chainwork() > self.tip().chainwork() {
            let old_tip = self.tip().clone();
            let forked_at = self.reorg_to(&entry)?;
            info!(
                old_tip = %old_tip.hash(),
                new_tip = %entry.hash(),
                %forked_at,
                "chain reorg"
            );
            return Ok(AttachOutcome::Reorged {
                old_tip,
                new_tip: entry,
                forked_at,
            });
        }

        debug!(%hash, height = entry.height(), "stored side-branch header");
        Ok(AttachOutcome::SideBranch(entry))
    }

    /// Attaches an entry revived from the store, skipping validation and
    /// observer delivery.  Used during startup replay; the row either
    /// extends the tip exactly or the store is corrupt.
    pub fn attach_trusted(&mut self, entry: ChainEntry) -> Result<(), ChainError> {
        let tip = self.tip();
        if *entry.prev_hash() != *tip.hash() || entry.height() != tip.height() + 1 {
            return Err(ChainError::InvariantViolation(format!(
                "replay row {} doesn't extend tip at {}",
                entry.height(),
                tip.height()
            )));
        }
        let hash = *entry.hash();
        self.main.insert(entry.height(), hash);
        self.entries.insert(hash, entry);
        self.tip = hash;
        self.prune();
        Ok(())
    }

    /// Drops everything and re-roots the chain, notifying observers once.
    pub fn reset(&mut self, root: ChainEntry, floor: u32) -> Result<(), ChainError> {
        self.entries.clear();
        self.main.clear();
        let hash = *root.hash();
        self.main.insert(root.height(), hash);
        self.entries.insert(hash, root.clone());
        self.tip = hash;
        self.floor = floor;
        self.notify_reset(&root)
    }

    fn extend_tip(&mut self, entry: &ChainEntry) -> Result<(), ChainError> {
        self.main.insert(entry.height(), *entry.hash());
        self.tip = *entry.hash();
        self.notify_connect(entry)?;
        self.prune();
        Ok(())
    }

    /// Unwinds the main chain to the fork point, then applies the branch.
    /// Returns the fork height.
    fn reorg_to(&mut self, new_tip: &ChainEntry) -> Result<u32, ChainError> {
        // Walk the branch back until it touches the main chain.
        let mut up = vec![new_tip.clone()];
        let fork = loop {
            let cursor = up.last().expect("chain: up non-empty");
            let parent = self
                .entries
                .get(cursor.prev_hash())
                .cloned()
                .ok_or_else(|| {
                    ChainError::InvariantViolation(format!(
                        "reorg: missing parent {} of {}",
                        cursor.prev_hash(),
                        cursor.hash()
                    ))
                })?;
            if self.is_main_chain(&parent) {
                break parent;
            }
            up.push(parent);
        };

        if fork.height() < self.floor {
            return Err(ChainError::InvariantViolation(format!(
                "reorg fork {} below floor {}",
                fork.height(),
                self.floor
            )));
        }

        // Disconnect from the old tip down to the fork.
        let old_tip_height = self.tip().height();
        for height in ((fork.height() + 1)..=old_tip_height).rev() {
            let hash = self.main.remove(&height).ok_or_else(|| {
                ChainError::InvariantViolation(format!("reorg: gap in main chain at {height}"))
            })?;
            let entry = self.entries.get(&hash).cloned().ok_or_else(|| {
                ChainError::InvariantViolation(format!("reorg: missing entry for {hash}"))
            })?;
            self.tip = *entry.prev_hash();
            self.notify_disconnect(&entry)?;
        }

        // Connect the branch, fork upward.
        for entry in up.iter().rev() {
            self.main.insert(entry.height(), *entry.hash());
            self.tip = *entry.hash();
            self.notify_connect(entry)?;
        }

        self.prune();
        Ok(fork.height())
    }

    fn prune(&mut self) {
        let cut = self.tip().height().saturating_sub(self.config.prune_depth);
        if cut == 0 {
            return;
        }
        let drop: Vec<u32> = self.main.range(..cut).map(|(h, _)| *h).collect();
        for height in drop {
            self.main.remove(&height);
        }
        self.entries.retain(|_, e| e.height() >= cut);
    }

    fn notify_connect(&self, entry: &ChainEntry) -> Result<(), ChainError> {
        for obs in &self.observers {
            obs.on_connect(entry).map_err(ChainError::Observer)?;
        }
        Ok(())
    }

    fn notify_disconnect(&self, entry: &ChainEntry) -> Result<(), ChainError> {
        for obs in &self.observers {
            obs.on_disconnect(entry).map_err(ChainError::Observer)?;
        }
        Ok(())
    }

    fn notify_reset(&self, tip: &ChainEntry) -> Result<(), ChainError> {
        for obs in &self.observers {
            obs.on_reset(tip).map_err(ChainError::Observer)?;
        }
        Ok(())
    }
}
