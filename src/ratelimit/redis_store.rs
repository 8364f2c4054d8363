//! Redis-backed counter store.
//!
//! Uses `INCR`, `EXPIRE` and `TTL`, which gives the atomic increment the
//! engine relies on when several server processes share one Redis.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::store::{CounterStore, StoreError};

/// Upper bound for the initial connection when none is given.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Counter store talking to a Redis server through a managed connection.
///
/// The connection manager reconnects on its own once the first connection
/// succeeded, so a single instance is created at startup and shared by
/// every request. Clones share the same connection slot.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    url: String,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("url", &self.url)
            .field("open", &self.connection.read().is_some())
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or no connection is made
    /// within two seconds.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_timeout(url, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to Redis at `url`, giving up after `timeout`.
    ///
    /// # Errors
    /// Returns [`StoreError::Timeout`] if Redis does not answer in time, or
    /// the classified Redis error if the URL is invalid or the connection is refused.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        // The manager retries the first connection with backoff, so it is bounded here.
        let connecting = ConnectionManager::new(client);
        let connection = match tokio::time::timeout(timeout, connecting).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(timeout.as_millis() as u64)),
        };
        info!(url = %url, "Connected to Redis counter store");

        Ok(Self {
            connection: Arc::new(RwLock::new(Some(connection))),
            url: url.to_string(),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.connection
            .read()
            .clone()
            .ok_or_else(|| StoreError::Unavailable("store is closed".to_string()))
    }
}

/// Map a `TTL` reply to seconds.
///
/// Redis answers -2 for a missing key and -1 for a key without expiry.
fn ttl_from_reply(reply: i64) -> Option<u64> {
    u64::try_from(reply).ok()
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        let count: i64 = conn.incr(key, 1).await?;
        // INCR never yields below 1 on a fresh or existing counter key.
        Ok(count.max(1) as u64)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        let applied: bool = conn.expire(key, seconds).await?;
        Ok(applied)
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection()?;
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl_from_reply(ttl))
    }

    async fn close(&self) -> Result<(), StoreError> {
        // Taking the manager out drops the shared socket once in-flight calls finish.
        let connection = self.connection.write().take();
        if connection.is_some() {
            debug!(url = %self.url, "Redis counter store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const REDIS_URL: &str = "redis://127.0.0.1/";

    /// Check if Redis is available before running live tests
    async fn redis_available() -> bool {
        RedisCounterStore::connect(REDIS_URL).await.is_ok()
    }

    fn unique_key(test_name: &str) -> String {
        format!("gatehouse-test:{}:{}", test_name, std::process::id())
    }

    #[test]
    fn test_ttl_reply_mapping() {
        assert_eq!(ttl_from_reply(-2), None);
        assert_eq!(ttl_from_reply(-1), None);
        assert_eq!(ttl_from_reply(0), Some(0));
        assert_eq!(ttl_from_reply(42), Some(42));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisCounterStore::connect("not a redis url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let started = Instant::now();
        let result = RedisCounterStore::connect_with_timeout(
            "redis://127.0.0.1:1/0",
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(
            result,
            Err(StoreError::Timeout(200)) | Err(StoreError::Unavailable(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_connection() {
        if !redis_available().await {
            eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
            return;
        }

        let store = RedisCounterStore::connect(REDIS_URL).await.unwrap();
        assert!(format!("{:?}", store).contains("open: true"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_fixed_window_commands() {
        if !redis_available().await {
            eprintln!("Skipping test: Redis not available");
            return;
        }

        let store = RedisCounterStore::connect(REDIS_URL).await.unwrap();
        let key = unique_key("window");
        let mut conn = store.connection().unwrap();
        let _: () = conn.del(&key).await.unwrap();

        // Missing key reports -2.
        assert_eq!(store.get_ttl(&key).await.unwrap(), None);
        assert!(!store.set_expiry(&key, 60).await.unwrap());

        assert_eq!(store.increment(&key).await.unwrap(), 1);
        assert_eq!(store.increment(&key).await.unwrap(), 2);

        // Key without expiry reports -1.
        assert_eq!(store.get_ttl(&key).await.unwrap(), None);

        assert!(store.set_expiry(&key, 60).await.unwrap());
        let ttl = store.get_ttl(&key).await.unwrap().unwrap();
        assert!(ttl > 0 && ttl <= 60);

        let _: () = conn.del(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_close_refuses_further_calls() {
        if !redis_available().await {
            eprintln!("Skipping test: Redis not available");
            return;
        }

        let store = RedisCounterStore::connect(REDIS_URL).await.unwrap();
        let shared = store.clone();
        store.close().await.unwrap();

        assert!(matches!(
            shared.increment(&unique_key("closed")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(format!("{:?}", shared).contains("open: false"));
        // Closing twice is harmless.
        store.close().await.unwrap();
    }
}
