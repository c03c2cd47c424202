//! In-memory store used by tests and the `memory = true` config option.

use std::collections::BTreeMap;

use bitcoin::BlockHash;
use parking_lot::Mutex;

use crate::traits::{HeaderProvider, HeaderStore};
use crate::types::{StoreFlags, StoreOp, StoredBlock};
use crate::DbResult;

#[derive(Debug, Default)]
struct MemInner {
    blocks: BTreeMap<u32, StoredBlock>,
    hashes: BTreeMap<u32, BlockHash>,
    version: Option<u32>,
    flags: Option<StoreFlags>,
    start_marker: Option<u32>,
}

/// A [`BTreeMap`]-backed header store with the same semantics as the RocksDB
/// one, including batch atomicity (the lock is held across the whole batch).
#[derive(Debug, Default)]
pub struct MemHeaderDb {
    inner: Mutex<MemInner>,
}

impl MemHeaderDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeaderStore for MemHeaderDb {
    fn apply_ops(&self, ops: &[StoreOp]) -> DbResult<()> {
        let mut inner = self.inner.lock();
        for op in ops {
            match op {
                StoreOp::PutBlock(height, block) => {
                    inner.hashes.insert(*height, block.block_hash());
                    inner.blocks.insert(*height, block.clone());
                }
                StoreOp::DelBlock(height) => {
                    inner.blocks.remove(height);
                    inner.hashes.remove(height);
                }
                StoreOp::SetStartMarker(height) => {
                    inner.start_marker = Some(*height);
                }
            }
        }
        Ok(())
    }

    fn put_version(&self, version: u32) -> DbResult<()> {
        self.inner.lock().version = Some(version);
        Ok(())
    }

    fn put_flags(&self, flags: &StoreFlags) -> DbResult<()> {
        self.inner.lock().flags = Some(flags.clone());
        Ok(())
    }

    fn prune_above(&self, height: u32) -> DbResult<()> {
        let mut inner = self.inner.lock();
        inner.blocks.retain(|h, _| *h <= height);
        inner.hashes.retain(|h, _| *h <= height);
        Ok(())
    }
}

impl HeaderProvider for MemHeaderDb {
    fn get_version(&self) -> DbResult<Option<u32>> {
        Ok(self.inner.lock().version)
    }

    fn get_flags(&self) -> DbResult<Option<StoreFlags>> {
        Ok(self.inner.lock().flags.clone())
    }

    fn get_start_marker(&self) -> DbResult<Option<u32>> {
        Ok(self.inner.lock().start_marker)
    }

    fn get_block(&self, height: u32) -> DbResult<Option<StoredBlock>> {
        Ok(self.inner.lock().blocks.get(&height).cloned())
    }

    fn get_hash(&self, height: u32) -> DbResult<Option<BlockHash>> {
        Ok(self.inner.lock().hashes.get(&height).copied())
    }

    fn chain_tip(&self) -> DbResult<Option<u32>> {
        Ok(self.inner.lock().blocks.keys().next_back().copied())
    }

    fn first_height(&self) -> DbResult<Option<u32>> {
        Ok(self.inner.lock().blocks.keys().next().copied())
    }
}

#[cfg(test)]
mod tests {
    use hnode_primitives::{ChainEntry, NetworkParams};

    use super::*;

    #[test]
    fn test_mem_matches_contract() {
        let db = MemHeaderDb::new();
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);
        let row = StoredBlock::from_entry(&entry, true);

        db.apply_ops(&[
            StoreOp::PutBlock(0, row.clone()),
            StoreOp::PutBlock(1, row.clone()),
            StoreOp::SetStartMarker(1),
        ])
        .unwrap();

        assert_eq!(db.chain_tip().unwrap(), Some(1));
        assert_eq!(db.first_height().unwrap(), Some(0));
        assert_eq!(db.get_start_marker().unwrap(), Some(1));
        assert_eq!(db.get_hash(1).unwrap(), Some(*entry.hash()));

        db.apply_ops(&[StoreOp::DelBlock(1)]).unwrap();
        assert_eq!(db.chain_tip().unwrap(), Some(0));
        assert_eq!(db.get_hash(1).unwrap(), None);
    }
}
