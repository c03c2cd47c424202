//! Trait definitions for the header store.  This borrows its
//! store/provider naming conventions from reth.

use bitcoin::BlockHash;

use crate::types::{StoreFlags, StoreOp, StoredBlock};
use crate::DbResult;

/// Write interface.  Only the header indexer holds one of these.
pub trait HeaderStore {
    /// Atomically applies a batch of mutations.  Either every op lands or
    /// none do; a crash mid-batch leaves the previous tip intact.
    fn apply_ops(&self, ops: &[StoreOp]) -> DbResult<()>;

    /// Writes the schema version.
    fn put_version(&self, version: u32) -> DbResult<()>;

    /// Writes the store flags.
    fn put_flags(&self, flags: &StoreFlags) -> DbResult<()>;

    /// Deletes every block row strictly above `height`.
    fn prune_above(&self, height: u32) -> DbResult<()>;
}

/// Read interface, shared by the indexer and the node queries.
pub trait HeaderProvider {
    fn get_version(&self) -> DbResult<Option<u32>>;

    fn get_flags(&self) -> DbResult<Option<StoreFlags>>;

    /// The custom start height, absent when syncing from genesis.
    fn get_start_marker(&self) -> DbResult<Option<u32>>;

    /// The block row at a height.
    fn get_block(&self, height: u32) -> DbResult<Option<StoredBlock>>;

    /// The hash accelerator row at a height.
    fn get_hash(&self, height: u32) -> DbResult<Option<BlockHash>>;

    /// Highest height with a block row, if any.
    fn chain_tip(&self) -> DbResult<Option<u32>>;

    /// Lowest height with a block row, if any.
    fn first_height(&self) -> DbResult<Option<u32>>;
}

/// The full database interface components get handed.
pub trait HeaderDatabase: HeaderStore + HeaderProvider + Send + Sync + 'static {}

impl<T: HeaderStore + HeaderProvider + Send + Sync + 'static> HeaderDatabase for T {}
