//! Counter store contract shared by every backend.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a counter store.
///
/// None of these reach the client: the admission middleware absorbs them
/// according to its configured failure mode.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store cannot be reached (connection refused, closed, ...)
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// A store call did not complete within the configured bound
    #[error("counter store call timed out after {0} ms")]
    Timeout(u64),

    /// The store answered with an error
    #[error("counter store backend error: {0}")]
    Backend(String),

    /// The store URL names no known backend
    #[error("unsupported counter store url: {0}")]
    UnsupportedUrl(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// A shared, network-accessible key/counter service.
///
/// `increment` must be atomic across every process sharing the store; the
/// engine never locks around it.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key`, creating it at 1 if absent.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Set the key to expire `seconds` from now. Returns `false` if the key does not exist.
    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool, StoreError>;

    /// Remaining time to live in seconds, or `None` if the key is missing or has no expiry.
    async fn get_ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Release the connection. Called once at shutdown; later calls on the
    /// store fail with [`StoreError::Unavailable`].
    async fn close(&self) -> Result<(), StoreError>;
}
