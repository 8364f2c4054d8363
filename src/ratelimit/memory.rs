//! In-process counter store.
//!
//! Shares state only within one process. Intended for development and tests;
//! deployments with more than one server process need a shared store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::store::{CounterStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Increments between two sweeps of expired entries.
const DEFAULT_SWEEP_EVERY: u64 = 1024;

/// A counter store backed by a concurrent hash map.
///
/// An expired entry is reset when its key is touched again. Entries nobody
/// touches are removed by a sweep that runs every `sweep_every` increments.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
    increments: AtomicU64,
    sweep_every: u64,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::with_sweep_every(DEFAULT_SWEEP_EVERY)
    }
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sweeps expired entries every `n` increments.
    pub fn with_sweep_every(n: u64) -> Self {
        Self {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            increments: AtomicU64::new(0),
            sweep_every: n.max(1),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed = removed, "Purged expired counters");
        }
        removed
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current count for `key`, if live.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count)
    }

    /// Entries held in the map, expired or not.
    #[cfg(test)]
    fn stored_entries(&self) -> usize {
        self.entries.len()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.ensure_open()?;

        // Sweep before taking an entry guard: `retain` locks every shard.
        let seen = self.increments.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.sweep_every == 0 {
            self.purge_expired();
        }

        let now = Instant::now();

        // The entry guard holds the shard lock, so read-modify-write is atomic per key.
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                count: 0,
                expires_at: None,
            };
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.ensure_open()?;
        let now = Instant::now();

        let ttl = self.entries.get(key).and_then(|entry| {
            let at = entry.expires_at?;
            let remaining = at.checked_duration_since(now).filter(|d| !d.is_zero())?;
            // Round up so a live key never reports zero seconds.
            Some(remaining.as_millis().div_ceil(1000) as u64)
        });
        Ok(ttl)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
        debug!("In-memory counter store closed");
        Ok(())
    }
}
