//! The header indexer: mirrors accepted chain events into the persistent
//! store, rebuilds the working chain from it at startup, and owns the
//! fast-sync bootstrap and locator computation.

pub mod bootstrap;
pub mod errors;
pub mod indexer;
pub mod locator;

pub use bootstrap::{validate_start_height, StartTip};
pub use errors::IndexError;
pub use indexer::HeaderIndexer;
pub use locator::chain_locator;
