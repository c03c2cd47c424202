use hnode_primitives::Network;
use thiserror::Error;

use crate::messages::PeerId;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("rpc returned no result for {0}")]
    MissingResult(String),

    #[error("peer {0} not connected")]
    PeerNotConnected(PeerId),

    #[error("explorer lookup not available on {0}; provide a raw start tip")]
    ExplorerUnsupported(Network),

    #[error("malformed payload: {0}")]
    BadPayload(String),
}
