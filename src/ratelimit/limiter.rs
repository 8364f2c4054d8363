//! Fixed-window rate limit decision engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::RateLimitingConfig;

use super::decision::RateLimitDecision;
use super::key::RateLimitKey;
use super::store::{CounterStore, StoreError};

/// Default upper bound for each store call.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// The decision engine that records usage in the counter store.
///
/// Holds no state of its own besides the shared store handle, so it can be
/// shared freely across tasks.
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared counter store
    store: Arc<dyn CounterStore>,
    /// Namespace for counter keys
    key_prefix: String,
    /// Bound applied to each individual store call
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter over `store`.
    pub fn new(store: Arc<dyn CounterStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Create a rate limiter using the key prefix and call timeout from `config`.
    pub fn from_config(store: Arc<dyn CounterStore>, config: &RateLimitingConfig) -> Self {
        Self::new(store, config.key_prefix.clone()).with_store_timeout(config.store_timeout())
    }

    /// Override the per-call store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The underlying store, e.g. for closing it at shutdown.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Build the counter key for an identifier.
    pub fn key_for(&self, identifier: &str) -> RateLimitKey {
        RateLimitKey::new(&self.key_prefix, identifier)
    }

    /// Record one request for `identifier` and decide whether it is admitted.
    ///
    /// The window is fixed: its expiry is set only by the increment that
    /// creates the key. Increment and expiry are separate store calls, so a
    /// crash in between can leave a key with no TTL.
    ///
    /// # Errors
    /// Returns the store error if the increment fails or times out. Expiry
    /// and TTL failures are tolerated.
    pub async fn evaluate(
        &self,
        identifier: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let rate_key = self.key_for(identifier);
        let key = rate_key.to_string_key();
        let log_key = rate_key.redacted();

        let count = self.bounded(self.store.increment(&key)).await?;
        trace!(key = %log_key, count = count, "Counter incremented");

        if count == 1 {
            match self.bounded(self.store.set_expiry(&key, window_seconds)).await {
                Ok(true) => {
                    debug!(key = %log_key, window_seconds = window_seconds, "Started new window");
                }
                Ok(false) => {
                    warn!(key = %log_key, "Counter vanished before its expiry could be set");
                }
                Err(e) => {
                    warn!(key = %log_key, error = %e, "Failed to set counter expiry");
                }
            }
        }

        let ttl = match self.bounded(self.store.get_ttl(&key)).await {
            Ok(ttl) => ttl,
            Err(e) => {
                debug!(key = %log_key, error = %e, "Failed to read counter TTL");
                None
            }
        };

        if ttl.is_none() && count > 1 {
            warn!(key = %log_key, count = count, "Counter has no expiry; window will not reset");
        }

        let decision = RateLimitDecision::new(
            count,
            limit,
            window_seconds,
            ttl,
            chrono::Utc::now().timestamp(),
        );

        if !decision.allowed {
            debug!(
                key = %log_key,
                count = count,
                limit = limit,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout.as_millis() as u64)),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("key_prefix", &self.key_prefix)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
