//! Per-request rate limit decision.

/// Outcome of evaluating one request against its fixed-window counter.
///
/// Computed fresh per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is within the limit
    pub allowed: bool,
    /// Counter value after this request was recorded
    pub current_count: u64,
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Unix timestamp (seconds) at which the window resets
    pub reset_at: Option<i64>,
    /// Remaining TTL reported by the store, if any
    pub ttl_remaining: Option<u64>,
}

impl RateLimitDecision {
    /// Build a decision from the counter value and the TTL read back from the store.
    pub fn new(count: u64, limit: u64, window_seconds: u64, ttl: Option<u64>, now: i64) -> Self {
        let ttl_remaining = ttl.filter(|t| *t > 0);
        let reset_after =
            i64::try_from(ttl_remaining.unwrap_or(window_seconds)).unwrap_or(i64::MAX);

        Self {
            allowed: count <= limit,
            current_count: count,
            limit,
            window_seconds,
            reset_at: Some(now.saturating_add(reset_after)),
            ttl_remaining,
        }
    }

    /// Quota left in the current window.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_count)
    }

    /// Seconds until the window resets, falling back to the full window when
    /// the store reported no TTL.
    pub fn reset_after(&self) -> u64 {
        self.ttl_remaining.unwrap_or(self.window_seconds)
    }
}
