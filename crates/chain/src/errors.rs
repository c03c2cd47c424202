use bitcoin::BlockHash;
use thiserror::Error;

/// One variant per consensus rule a header can break.  The caller decides
/// what a failure means for the peer that sent it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidHeaderError {
    #[error("hash doesn't meet the target encoded in bits")]
    ProofOfWork,

    #[error("bits encode a target above the pow limit")]
    BitsAboveLimit,

    #[error("wrong bits (got {got:#010x}, expected {expected:#010x})")]
    WrongBits { got: u32, expected: u32 },

    #[error("time {time} not above median-time-past {mtp}")]
    TimeTooOld { time: u32, mtp: u32 },

    #[error("prev hash doesn't match the supplied parent")]
    BadPrevHash,

    #[error("block at checkpoint height {height} doesn't match the checkpoint")]
    FailedCheckpoint { height: u32 },
}

/// Contextual validation outcome.  Missing ancestry is not the header's
/// fault; it means the chain state itself is broken.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Invalid(#[from] InvalidHeaderError),

    #[error("missing ancestor at height {0} for contextual checks")]
    MissingAncestor(u32),
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// Header rejected by a consensus rule; report the sender, don't die.
    #[error("invalid header {hash}: {kind}")]
    Invalid {
        hash: BlockHash,
        kind: InvalidHeaderError,
    },

    /// Parent unknown; the header may be an orphan worth chasing.
    #[error("parent {prev} of header {hash} not known")]
    MissingParent { hash: BlockHash, prev: BlockHash },

    /// An observer failed to persist an event.  Fatal.
    #[error("observer: {0}")]
    Observer(#[source] anyhow::Error),

    /// The chain structure itself is inconsistent.  Fatal; signals a bug.
    #[error("chain invariant broken: {0}")]
    InvariantViolation(String),
}

impl ChainError {
    /// Whether the error indicts the header (and so its sender) rather than
    /// this node.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, ChainError::Invalid { .. })
    }
}
