//! The node's outward-facing seams.
//!
//! Wire framing, handshakes, and ban bookkeeping belong to an external peer
//! manager; this crate defines the narrow interface the sync driver talks
//! through ([`PeerOps`] plus the [`PeerEvent`] stream), the explorer client
//! used for the custom-start bootstrap, and a trusted bitcoind JSON-RPC
//! client usable as a stand-in header source.

pub mod bitcoind;
pub mod errors;
pub mod explorer;
pub mod messages;
pub mod traits;

pub use bitcoind::BitcoindClient;
pub use errors::{NetError, NetResult};
pub use explorer::ExplorerClient;
pub use messages::{GetHeadersMessage, PeerEvent, PeerId};
pub use traits::PeerOps;
