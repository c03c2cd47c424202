//! Chain events and the observer interface.
//!
//! Observers are registered up front and called synchronously in acceptance
//! order; during a reorg every disconnect lands before the first connect.

use hnode_primitives::ChainEntry;

/// The events a working chain emits.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block joined the main chain.
    Connect(ChainEntry),

    /// A block left the main chain during a reorg.
    Disconnect(ChainEntry),

    /// The chain was re-rooted at a new tip.
    Reset(ChainEntry),
}

impl ChainEvent {
    pub fn entry(&self) -> &ChainEntry {
        match self {
            ChainEvent::Connect(e) | ChainEvent::Disconnect(e) | ChainEvent::Reset(e) => e,
        }
    }
}

/// Something that mirrors chain events, typically into persistent storage.
///
/// An `Err` from any method aborts the chain operation that emitted the
/// event; the indexer uses this to make store failures fatal.
pub trait ChainObserver: Send + Sync {
    fn on_connect(&self, entry: &ChainEntry) -> anyhow::Result<()>;

    fn on_disconnect(&self, entry: &ChainEntry) -> anyhow::Result<()>;

    fn on_reset(&self, tip: &ChainEntry) -> anyhow::Result<()>;
}
