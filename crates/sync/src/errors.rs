use hnode_chain::ChainError;
use hnode_db::DbError;
use hnode_index::IndexError;
use thiserror::Error;

/// Fatal sync-driver errors.  Per-header validation failures never surface
/// here; they turn into peer reports.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("db: {0}")]
    Db(#[from] DbError),
}
