/// Library-level configuration for the storage core.
///
/// Controls claim defaults and pagination/sweep tuning. Parsing these
/// values from environment or file configuration is the caller's
/// responsibility; this crate only defines and defaults the struct.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Claim TTL applied when a caller does not specify one, in seconds.
    pub default_claim_ttl_secs: u64,
    /// Maximum messages a single `claim.create` call may reserve when the
    /// caller does not specify a limit.
    pub default_claim_limit: usize,
    /// Default page size for `queue.list` and `message.list`.
    pub default_list_limit: usize,
    /// Interval at which the in-memory reference store's background sweeper
    /// reaps expired messages, in seconds. Independent of the per-read
    /// `e > now` filter, which is what actually keeps expired messages
    /// invisible between sweeps.
    pub ttl_sweep_interval_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_claim_ttl_secs: 60,
            default_claim_limit: 10,
            default_list_limit: 10,
            ttl_sweep_interval_secs: 30,
        }
    }
}
