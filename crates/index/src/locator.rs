//! Block locator computation.
//!
//! The shape is the usual one (dense near the tip, exponentially sparse
//! further back) with one deliberate divergence from a stock node: the walk
//! stops at the chain's effective floor.  A fast-synced node has no
//! ancestry below its start height and must never advertise the genesis
//! hash it doesn't possess.

use bitcoin::BlockHash;
use hnode_db::HeaderProvider;

use crate::errors::IndexError;

/// Hashes negotiating sync with a peer: tip first, strictly decreasing in
/// height, floor hash last.
pub fn chain_locator<D: HeaderProvider>(
    db: &D,
    tip: u32,
    floor: u32,
) -> Result<Vec<BlockHash>, IndexError> {
    let mut hashes = Vec::new();
    let mut step: u64 = 1;
    let mut height = tip as i64;

    while height > floor as i64 {
        hashes.push(hash_at(db, height as u32)?);
        if hashes.len() >= 10 {
            step *= 2;
        }
        height -= step as i64;
    }

    hashes.push(hash_at(db, floor)?);
    Ok(hashes)
}

fn hash_at<D: HeaderProvider>(db: &D, height: u32) -> Result<BlockHash, IndexError> {
    db.get_hash(height)?.ok_or(IndexError::MissingRow(height))
}
