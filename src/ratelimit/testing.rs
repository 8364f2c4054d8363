//! Store doubles for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::memory::InMemoryCounterStore;
use super::store::{CounterStore, StoreError};

/// Which store call misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Increment,
    Expiry,
    Ttl,
    /// Every call blocks far longer than any test timeout.
    Hang,
}

/// An in-memory store that counts calls and injects one kind of fault.
pub struct ScriptedStore {
    inner: InMemoryCounterStore,
    fault: Fault,
    increments: AtomicUsize,
    expiries: AtomicUsize,
    ttls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::with_fault(Fault::None)
    }

    pub fn with_fault(fault: Fault) -> Self {
        Self {
            inner: InMemoryCounterStore::new(),
            fault,
            increments: AtomicUsize::new(0),
            expiries: AtomicUsize::new(0),
            ttls: AtomicUsize::new(0),
        }
    }

    pub fn increment_calls(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }

    pub fn expiry_calls(&self) -> usize {
        self.expiries.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.increment_calls() + self.expiry_calls() + self.ttls.load(Ordering::SeqCst)
    }

    async fn maybe_fail(&self, call: Fault) -> Result<(), StoreError> {
        if self.fault == Fault::Hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fault == call {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for ScriptedStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(Fault::Increment).await?;
        self.inner.increment(key).await
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        self.expiries.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(Fault::Expiry).await?;
        self.inner.set_expiry(key, seconds).await
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.ttls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(Fault::Ttl).await?;
        self.inner.get_ttl(key).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}
