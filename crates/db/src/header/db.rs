use std::path::Path;

use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use rockbound::{Schema, SchemaBatch, DB};
use rocksdb::Options;

use crate::traits::{HeaderProvider, HeaderStore};
use crate::types::{StoreFlags, StoreOp, StoredBlock};
use crate::DbResult;

use super::schemas::{
    BlockHeightSchema, FlagsSchema, HashByHeightSchema, StartMarkerSchema, VersionSchema, META_KEY,
};

const DB_NAME: &str = "header_db";

/// RocksDB-backed header store.
pub struct HeaderDb {
    db: DB,
}

fn get_db_opts() -> Options {
    let mut db_opts = Options::default();
    db_opts.create_missing_column_families(true);
    db_opts.create_if_missing(true);
    db_opts
}

impl HeaderDb {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db_opts = get_db_opts();
        let column_families = vec![
            BlockHeightSchema::COLUMN_FAMILY_NAME,
            HashByHeightSchema::COLUMN_FAMILY_NAME,
            VersionSchema::COLUMN_FAMILY_NAME,
            FlagsSchema::COLUMN_FAMILY_NAME,
            StartMarkerSchema::COLUMN_FAMILY_NAME,
        ];
        let store = Self {
            db: DB::open(path, DB_NAME, column_families, &db_opts)?,
        };
        Ok(store)
    }

    fn add_op(batch: &mut SchemaBatch, op: &StoreOp) -> DbResult<()> {
        match op {
            StoreOp::PutBlock(height, block) => {
                batch.put::<BlockHeightSchema>(height, block)?;
                batch.put::<HashByHeightSchema>(height, &block.block_hash().to_byte_array())?;
            }
            StoreOp::DelBlock(height) => {
                batch.delete::<BlockHeightSchema>(height)?;
                batch.delete::<HashByHeightSchema>(height)?;
            }
            StoreOp::SetStartMarker(height) => {
                batch.put::<StartMarkerSchema>(&META_KEY, height)?;
            }
        }
        Ok(())
    }
}

impl HeaderStore for HeaderDb {
    fn apply_ops(&self, ops: &[StoreOp]) -> DbResult<()> {
        let mut batch = SchemaBatch::new();
        for op in ops {
            Self::add_op(&mut batch, op)?;
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn put_version(&self, version: u32) -> DbResult<()> {
        self.db.put::<VersionSchema>(&META_KEY, &version)?;
        Ok(())
    }

    fn put_flags(&self, flags: &StoreFlags) -> DbResult<()> {
        self.db.put::<FlagsSchema>(&META_KEY, flags)?;
        Ok(())
    }

    fn prune_above(&self, height: u32) -> DbResult<()> {
        // Walk down from the top so we stop as soon as we're under the cut.
        let iterator = self.db.iter::<BlockHeightSchema>()?.into_iter().rev();
        let mut batch = SchemaBatch::new();
        for res in iterator {
            let (row_height, _) = res?.into_tuple();
            if row_height <= height {
                break;
            }
            batch.delete::<BlockHeightSchema>(&row_height)?;
            batch.delete::<HashByHeightSchema>(&row_height)?;
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}

impl HeaderProvider for HeaderDb {
    fn get_version(&self) -> DbResult<Option<u32>> {
        Ok(self.db.get::<VersionSchema>(&META_KEY)?)
    }

    fn get_flags(&self) -> DbResult<Option<StoreFlags>> {
        Ok(self.db.get::<FlagsSchema>(&META_KEY)?)
    }

    fn get_start_marker(&self) -> DbResult<Option<u32>> {
        Ok(self.db.get::<StartMarkerSchema>(&META_KEY)?)
    }

    fn get_block(&self, height: u32) -> DbResult<Option<StoredBlock>> {
        Ok(self.db.get::<BlockHeightSchema>(&height)?)
    }

    fn get_hash(&self, height: u32) -> DbResult<Option<BlockHash>> {
        let raw = self.db.get::<HashByHeightSchema>(&height)?;
        Ok(raw.map(BlockHash::from_byte_array))
    }

    fn chain_tip(&self) -> DbResult<Option<u32>> {
        let mut iterator = self.db.iter::<BlockHeightSchema>()?.into_iter().rev();
        if let Some(res) = iterator.next() {
            let (tip, _) = res?.into_tuple();
            Ok(Some(tip))
        } else {
            Ok(None)
        }
    }

    fn first_height(&self) -> DbResult<Option<u32>> {
        let mut iterator = self.db.iter::<BlockHeightSchema>()?.into_iter();
        if let Some(res) = iterator.next() {
            let (height, _) = res?.into_tuple();
            Ok(Some(height))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use hnode_primitives::{ChainEntry, NetworkParams};
    use tempfile::TempDir;

    use super::*;

    fn open_temp() -> (TempDir, HeaderDb) {
        let dir = TempDir::new().unwrap();
        let db = HeaderDb::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_block_row_roundtrip() {
        let (_dir, db) = open_temp();
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);

        let row = StoredBlock::from_entry(&entry, false);
        db.apply_ops(&[StoreOp::PutBlock(0, row.clone())]).unwrap();

        assert_eq!(db.get_block(0).unwrap(), Some(row));
        assert_eq!(db.get_hash(0).unwrap(), Some(*entry.hash()));
        assert_eq!(db.get_block(1).unwrap(), None);
    }

    #[test]
    fn test_tip_is_highest_height() {
        let (_dir, db) = open_temp();
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);

        assert_eq!(db.chain_tip().unwrap(), None);

        // Heights whose big-endian order differs from little-endian order.
        for height in [0u32, 1, 255, 256, 300] {
            let e = ChainEntry::new(params.genesis, height, entry.chainwork());
            db.apply_ops(&[StoreOp::PutBlock(height, StoredBlock::from_entry(&e, true))])
                .unwrap();
        }

        assert_eq!(db.chain_tip().unwrap(), Some(300));
        assert_eq!(db.first_height().unwrap(), Some(0));
    }

    #[test]
    fn test_batch_del_and_marker() {
        let (_dir, db) = open_temp();
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);
        let row = StoredBlock::from_entry(&entry, true);

        db.apply_ops(&[
            StoreOp::PutBlock(49, row.clone()),
            StoreOp::PutBlock(50, row.clone()),
            StoreOp::SetStartMarker(50),
        ])
        .unwrap();

        assert_eq!(db.get_start_marker().unwrap(), Some(50));

        db.apply_ops(&[StoreOp::DelBlock(50)]).unwrap();
        assert_eq!(db.get_block(50).unwrap(), None);
        assert_eq!(db.get_hash(50).unwrap(), None);
        assert_eq!(db.chain_tip().unwrap(), Some(49));
    }

    #[test]
    fn test_prune_above() {
        let (_dir, db) = open_temp();
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);
        let row = StoredBlock::from_entry(&entry, true);

        let ops: Vec<_> = (0..10).map(|h| StoreOp::PutBlock(h, row.clone())).collect();
        db.apply_ops(&ops).unwrap();

        db.prune_above(6).unwrap();
        assert_eq!(db.chain_tip().unwrap(), Some(6));
        assert_eq!(db.get_block(7).unwrap(), None);
        assert!(db.get_block(6).unwrap().is_some());
    }

    #[test]
    fn test_version_and_flags() {
        let (_dir, db) = open_temp();
        assert_eq!(db.get_version().unwrap(), None);

        db.put_version(1).unwrap();
        let flags = StoreFlags {
            network: hnode_primitives::Network::Regtest,
            fast_sync: false,
        };
        db.put_flags(&flags).unwrap();

        assert_eq!(db.get_version().unwrap(), Some(1));
        assert_eq!(db.get_flags().unwrap(), Some(flags));
    }
}
