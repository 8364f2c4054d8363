//! Counter store selection from a connection URL.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::memory::InMemoryCounterStore;
use super::redis_store::RedisCounterStore;
use super::store::{CounterStore, StoreError};

/// URL scheme selecting the in-process store.
pub const MEMORY_SCHEME: &str = "memory://";

/// Open the counter store named by `url`.
///
/// `memory://` gives a store local to this process. `redis://`, `rediss://`
/// and `redis+unix://` connect to Redis, bounded by `connect_timeout`.
///
/// # Errors
/// Returns [`StoreError::UnsupportedUrl`] for any other scheme, or the Redis
/// connection error.
pub async fn open_store(
    url: &str,
    connect_timeout: Duration,
) -> Result<Arc<dyn CounterStore>, StoreError> {
    if url.starts_with(MEMORY_SCHEME) {
        info!("Using in-process counter store");
        return Ok(Arc::new(InMemoryCounterStore::new()));
    }

    if ["redis://", "rediss://", "redis+unix://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
    {
        let store = RedisCounterStore::connect_with_timeout(url, connect_timeout).await?;
        return Ok(Arc::new(store));
    }

    Err(StoreError::UnsupportedUrl(url.to_string()))
}
