//! The in-memory working chain and the header validator.
//!
//! The working chain holds the recent portion of the best chain plus any
//! competing branches, resolves reorgs by cumulative work, and delivers
//! connect/disconnect/reset events synchronously to its observers.  The
//! validator is a pure function over a candidate header and its parent
//! entry.

pub mod chain;
pub mod errors;
pub mod events;
pub mod validator;

pub use chain::{AttachOutcome, ChainConfig, WorkingChain};
pub use errors::{ChainError, InvalidHeaderError, ValidatorError};
pub use events::{ChainEvent, ChainObserver};
