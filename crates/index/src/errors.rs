use hnode_chain::ChainError;
use hnode_db::DbError;
use hnode_primitives::Network;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("store schema version {found} unsupported (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("store was created for network {stored}, node configured for {configured}")]
    NetworkMismatch {
        stored: Network,
        configured: Network,
    },

    /// The stored start marker is authoritative; a conflicting configured
    /// start height is a configuration error, not something to repair.
    #[error("configured start height {configured} doesn't match stored start marker {stored}")]
    StartMarkerMismatch { configured: u32, stored: u32 },

    #[error("start height must be at least 1")]
    StartHeightZero,

    #[error(
        "start height {requested} is past the last retarget boundary before \
         the last checkpoint; the maximum allowable start is {max}"
    )]
    StartHeightTooHigh { requested: u32, max: u32 },

    #[error("start height {requested} must be below the last checkpoint {last_checkpoint}")]
    StartPastCheckpoint {
        requested: u32,
        last_checkpoint: u32,
    },

    #[error("start tip headers don't link: {0}")]
    BadStartTip(String),

    #[error("refusing to reset to {requested} below the start marker {start}")]
    ResetBelowStart { requested: u32, start: u32 },

    #[error("missing block row at height {0}")]
    MissingRow(u32),

    #[error("store corrupt: {0}")]
    Corrupt(String),
}
