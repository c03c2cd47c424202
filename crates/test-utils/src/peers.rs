//! A recording peer-manager double.

use async_trait::async_trait;
use hnode_net::{GetHeadersMessage, NetResult, PeerId, PeerOps};
use parking_lot::Mutex;

/// Records every call the sync driver makes.
#[derive(Default)]
pub struct RecordingPeers {
    pub sent: Mutex<Vec<(PeerId, GetHeadersMessage)>>,
    pub reports: Mutex<Vec<(PeerId, u32, String)>>,
    pub demoted: Mutex<Vec<PeerId>>,
}

#[async_trait]
impl PeerOps for RecordingPeers {
    async fn send_get_headers(&self, peer: PeerId, msg: GetHeadersMessage) -> NetResult<()> {
        self.sent.lock().push((peer, msg));
        Ok(())
    }

    fn report_misbehaviour(&self, peer: PeerId, score: u32, reason: &str) {
        self.reports.lock().push((peer, score, reason.to_string()));
    }

    fn demote(&self, peer: PeerId) {
        self.demoted.lock().push(peer);
    }
}
