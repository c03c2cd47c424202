//! Protocol constants that aren't per-network tunables.

/// Number of previous blocks whose timestamps feed the median-time-past rule.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Maximum number of headers a peer may send in one `headers` message.
pub const MAX_HEADERS_PER_MSG: usize = 2000;

/// Current schema version of the header store.
pub const STORE_SCHEMA_VERSION: u32 = 1;
