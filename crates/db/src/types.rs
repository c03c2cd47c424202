//! Value types written to the header store.

use bitcoin::block::Header;
use bitcoin::hashes::Hash;
use bitcoin::pow::Work;
use bitcoin::BlockHash;
use borsh::{BorshDeserialize, BorshSerialize};
use hnode_primitives::entry::{decode_header, encode_header};
use hnode_primitives::{ChainEntry, Network};

use crate::errors::DbError;

/// A block row.
///
/// Heights at or below the historical point keep only the 80 raw bytes;
/// above it the full entry is kept so the working chain can be rebuilt with
/// its cumulative work intact.  The borsh discriminant is the one-byte tag
/// distinguishing the two on disk.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum StoredBlock {
    /// Bare wire header; ancestry fixed by checkpoint.
    Header([u8; 80]),

    /// Header plus the context needed to revive a [`ChainEntry`].
    Entry {
        raw: [u8; 80],
        height: u32,
        chainwork: [u8; 32],
    },
}

impl StoredBlock {
    /// Builds the row for `entry`, keeping the full record only when the
    /// height is above the historical point.
    pub fn from_entry(entry: &ChainEntry, historical: bool) -> Self {
        if historical {
            StoredBlock::Header(entry.raw_header())
        } else {
            StoredBlock::Entry {
                raw: entry.raw_header(),
                height: entry.height(),
                chainwork: entry.chainwork().to_be_bytes(),
            }
        }
    }

    pub fn is_historical(&self) -> bool {
        matches!(self, StoredBlock::Header(_))
    }

    pub fn raw(&self) -> &[u8; 80] {
        match self {
            StoredBlock::Header(raw) => raw,
            StoredBlock::Entry { raw, .. } => raw,
        }
    }

    /// Hash of the stored header, computed without a full decode.
    pub fn block_hash(&self) -> BlockHash {
        let h = bitcoin::hashes::sha256d::Hash::hash(self.raw());
        BlockHash::from_raw_hash(h)
    }

    pub fn header(&self, height: u32) -> Result<Header, DbError> {
        decode_header(self.raw()).map_err(|_| DbError::MalformedBlockRow(height))
    }

    /// Revives the chain entry at `height`.  Bare rows come back with a
    /// zero-work placeholder.
    pub fn to_entry(&self, height: u32) -> Result<ChainEntry, DbError> {
        let header = self.header(height)?;
        let entry = match self {
            StoredBlock::Header(_) => ChainEntry::with_zero_work(header, height),
            StoredBlock::Entry {
                height: stored_height,
                chainwork,
                ..
            } => {
                if *stored_height != height {
                    return Err(DbError::MalformedBlockRow(height));
                }
                ChainEntry::new(header, height, Work::from_be_bytes(*chainwork))
            }
        };
        Ok(entry)
    }
}

impl From<&ChainEntry> for StoredBlock {
    fn from(entry: &ChainEntry) -> Self {
        StoredBlock::from_entry(entry, false)
    }
}

/// Flags recorded when the store is first created and verified on reopen.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct StoreFlags {
    /// Network the store was written for.
    pub network: Network,

    /// Whether the store was bootstrapped from a custom start tip.
    pub fast_sync: bool,
}

/// One mutation in an atomic batch.
#[derive(Clone, Debug)]
pub enum StoreOp {
    /// Writes the block row and its hash accelerator at a height.
    PutBlock(u32, StoredBlock),

    /// Deletes the block row and hash at a height.
    DelBlock(u32),

    /// Records the custom start height.
    SetStartMarker(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use hnode_primitives::NetworkParams;

    #[test]
    fn test_stored_block_roundtrip() {
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);

        for historical in [true, false] {
            let row = StoredBlock::from_entry(&entry, historical);
            let encoded = borsh::to_vec(&row).unwrap();
            let decoded: StoredBlock = borsh::from_slice(&encoded).unwrap();
            assert_eq!(decoded, row);
            assert_eq!(decoded.block_hash(), *entry.hash());

            let revived = decoded.to_entry(0).unwrap();
            assert_eq!(revived.header(), entry.header());
            if historical {
                assert!(revived.chainwork() < entry.chainwork());
            } else {
                assert_eq!(revived, entry);
            }
        }
    }

    #[test]
    fn test_stored_block_tag_byte() {
        let params = NetworkParams::regtest();
        let entry = ChainEntry::genesis(&params);

        let bare = borsh::to_vec(&StoredBlock::from_entry(&entry, true)).unwrap();
        let full = borsh::to_vec(&StoredBlock::from_entry(&entry, false)).unwrap();
        assert_eq!(bare.len(), 1 + 80);
        assert_eq!(full.len(), 1 + 80 + 4 + 32);
        assert_eq!(bare[0], 0);
        assert_eq!(full[0], 1);
    }

    #[test]
    fn test_entry_height_mismatch_rejected() {
        let params = NetworkParams::regtest();
        let entry = ChainEntry::new(params.genesis, 7, params.genesis.work());
        let row = StoredBlock::from_entry(&entry, false);
        assert!(row.to_entry(8).is_err());
    }
}
