use rockbound::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("rocksdb: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// A block row whose payload can't be decoded back into a header.
    #[error("malformed block row at height {0}")]
    MalformedBlockRow(u32),

    #[error("tried to insert block row {1} while tip is {0}")]
    OooInsert(u32, u32),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for DbError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

impl From<CodecError> for DbError {
    fn from(value: CodecError) -> Self {
        Self::Other(value.to_string())
    }
}
