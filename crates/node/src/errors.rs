use hnode_chain::ChainError;
use hnode_db::DbError;
use hnode_index::IndexError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("config: {0}")]
    Config(String),
}
