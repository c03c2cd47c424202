#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// How long a peer may sit on a `getheaders` before being demoted.
    pub response_timeout_ms: u32,

    /// How long orphans wait for their ancestry before being ejected.
    pub orphan_timeout_ms: u32,

    /// How many times an orphan root may be re-requested.
    pub max_orphan_rounds: u32,
}

impl DriverConfig {
    pub fn new(response_timeout_ms: u32, orphan_timeout_ms: u32, max_orphan_rounds: u32) -> Self {
        Self {
            response_timeout_ms,
            orphan_timeout_ms,
            max_orphan_rounds,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 30_000,
            orphan_timeout_ms: 60_000,
            max_orphan_rounds: 3,
        }
    }
}
