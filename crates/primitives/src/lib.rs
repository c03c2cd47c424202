//! Common types shared across the header node crates.

pub mod constants;
pub mod entry;
pub mod params;

pub use entry::ChainEntry;
pub use params::{Checkpoint, Network, NetworkParams};
