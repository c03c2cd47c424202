//! Cross-cutting utilities: logging setup and retry policies.

pub mod logging;
pub mod retry;
