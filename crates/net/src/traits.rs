//! The interface the sync driver drives the peer manager through.

use async_trait::async_trait;

use crate::errors::NetResult;
use crate::messages::{GetHeadersMessage, PeerId};

/// Outbound operations on the external peer manager.
///
/// Handles flow one way only: the driver holds a `PeerOps`, the peer
/// manager holds the event channel sender.  Neither side calls back into
/// the other.
#[async_trait]
pub trait PeerOps: Send + Sync {
    /// Sends a `getheaders` to one peer.
    async fn send_get_headers(&self, peer: PeerId, msg: GetHeadersMessage) -> NetResult<()>;

    /// Reports misbehaviour for ban scoring.  Fire-and-forget.
    fn report_misbehaviour(&self, peer: PeerId, score: u32, reason: &str);

    /// Demotes a peer that stopped answering in time.
    fn demote(&self, peer: PeerId);
}
