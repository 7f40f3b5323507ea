//! Replay store for single-use request identifiers.
//!
//! Implement [`ReplayStore`] over Redis, a database, etc. for multi-node
//! deployments. [`MemoryReplayStore`] serves a single process and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::StoreError;

/// Key-value store with per-key expiry.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Whether a live (unexpired) entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Unconditionally write `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write `key` only if no live entry exists.
    ///
    /// Returns `Ok(true)` if this call created the entry, `Ok(false)` if one
    /// was already present. Must be atomic: among concurrent callers for the
    /// same key at most one observes `true`.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

struct StoredValue {
    value: String,
    /// `None` when `now + ttl` overflows `Instant`: never expires
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &str, now: Instant, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory replay store with lazy expiry.
///
/// Expired entries are ignored on lookup and overwritten on insert;
/// [`purge_expired`](Self::purge_expired) reclaims their memory.
#[derive(Default)]
pub struct MemoryReplayStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone())
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, stored| stored.is_live(now));
    }

    /// Spawn a tokio task purging expired entries every `interval`.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let before = store.len();
                store.purge_expired();
                let purged = before.saturating_sub(store.len());
                if purged > 0 {
                    tracing::debug!("[REPLAY] Purged {} expired identifiers", purged);
                }
            }
        })
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|stored| stored.is_live(now)))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, Instant::now(), ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let fresh = StoredValue::new(value, now, ttl);

        // The entry guard holds the shard lock across check and insert.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }
}
