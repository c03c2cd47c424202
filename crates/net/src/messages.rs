//! Messages crossing the peer-manager seam.

use std::fmt;

use bitcoin::block::Header;
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;

/// Opaque peer identifier assigned by the peer manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// A `getheaders` request: a sparse locator plus a stop hash (all-zero to
/// ask for as many headers as the peer will give).
#[derive(Clone, Debug)]
pub struct GetHeadersMessage {
    pub locator: Vec<BlockHash>,
    pub stop: BlockHash,
}

impl GetHeadersMessage {
    pub fn new(locator: Vec<BlockHash>, stop: Option<BlockHash>) -> Self {
        Self {
            locator,
            stop: stop.unwrap_or_else(BlockHash::all_zeros),
        }
    }

    pub fn wants_everything(&self) -> bool {
        self.stop == BlockHash::all_zeros()
    }
}

/// What the peer manager pushes into the sync driver.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// A peer finished its handshake and can serve headers.
    Connected(PeerId),

    /// A peer went away; outstanding requests to it are void.
    Disconnected(PeerId),

    /// A `headers` payload, at most 2000 entries, already decoded.
    Headers(PeerId, Vec<Header>),

    /// A block announcement (`inv`) naming a hash we may not have.
    BlockAnnounced(PeerId, BlockHash),
}
