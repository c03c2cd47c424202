//! The sync driver: turns peer events into working-chain updates.
//!
//! Issues locator-based `getheaders`, ingests header batches with one
//! atomic store commit per batch, chases orphan roots with bounded retries,
//! and reports misbehaving peers back to the peer manager.

pub mod config;
pub mod driver;
pub mod errors;
pub mod orphans;
pub mod status;

pub use config::DriverConfig;
pub use driver::{header_sync_task, SyncDriver};
pub use errors::SyncError;
pub use orphans::OrphanPool;
pub use status::SyncStatus;
