//! Sync progress snapshots, published over a watch channel.

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::BlockHash;

/// What the driver knows about its own progress.  Cheap to clone; readers
/// hold a watch receiver and never block the driver.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Working-chain tip height.
    pub tip_height: u32,

    /// Working-chain tip hash.
    pub tip_hash: Option<BlockHash>,

    /// Headers accepted over the life of the driver.
    pub headers_accepted: u64,

    /// Reorgs applied over the life of the driver.
    pub reorgs: u64,

    /// Orphan roots currently waiting for ancestry.
    pub orphans_pending: usize,

    /// Unix millis of the last driver activity.
    pub last_update_ms: u64,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("sync: system clock before epoch")
        .as_millis() as u64
}
