//! Persistent header store: trait definitions plus the RocksDB-backed and
//! in-memory implementations.

pub mod errors;
#[macro_use]
pub mod macros;
pub mod header;
pub mod mem;
pub mod traits;
pub mod types;

pub use errors::DbError;
pub use header::db::HeaderDb;
pub use mem::MemHeaderDb;
pub use traits::{HeaderDatabase, HeaderProvider, HeaderStore};
pub use types::{StoreFlags, StoreOp, StoredBlock};

pub type DbResult<T> = anyhow::Result<T, errors::DbError>;
