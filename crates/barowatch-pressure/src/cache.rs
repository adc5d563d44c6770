//! TTL cache tier with per-key fetch coalescing.
//!
//! A tier owns a `CacheStore` and an in-flight map. Concurrent misses on one
//! key share a single fetch; every waiter receives the leader's outcome,
//! failures included. Failures are never cached.

use barowatch_core::WeatherError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{CacheEntry, WeatherSnapshot};

/// Time source for entry freshness
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Backing storage for one tier.
///
/// Implementations replace entries whole; a reader never sees a partial one.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> anyhow::Result<Option<CacheEntry>>;
    fn save(&self, entry: &CacheEntry) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn save(&self, entry: &CacheEntry) -> anyhow::Result<()> {
        self.entries.write().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Outcome of `CacheTier::get_or_fetch`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub snapshot: WeatherSnapshot,
    /// The value came from a fetch made for this lookup, not from the store.
    pub fresh: bool,
}

pub type FetchOutcome = Result<CacheLookup, WeatherError>;

pub struct CacheTier {
    name: &'static str,
    ttl: chrono::Duration,
    serve_stale_on_error: bool,
    store: Box<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<FetchOutcome>>>>,
}

impl std::fmt::Debug for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTier")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("serve_stale_on_error", &self.serve_stale_on_error)
            .finish_non_exhaustive()
    }
}

impl CacheTier {
    pub fn new(
        name: &'static str,
        ttl: chrono::Duration,
        store: Box<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            ttl,
            serve_stale_on_error: false,
            store,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory tier on the system clock
    pub fn in_memory(name: &'static str, ttl: chrono::Duration) -> Self {
        Self::new(name, ttl, Box::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// Serve an expired entry, flagged degraded, when a refresh fails transiently.
    pub fn with_serve_stale_on_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_error = enabled;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Return the entry for `key` if fresh, otherwise run (or join) a fetch.
    ///
    /// At most one `fetch` runs per key at a time. A successful, non-degraded
    /// result replaces the stored entry. If the leader is dropped before it
    /// settles, one of its waiters takes over with its own `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<WeatherSnapshot, WeatherError>>,
    {
        let (tx, stale) = loop {
            if let Some(hit) = self.fresh_hit(key, self.load(key).as_ref()) {
                return Ok(hit);
            }

            let rx = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(key) {
                    Some(rx) => rx.clone(),
                    None => {
                        // Re-checked under the lock so a just-finished leader's write is seen.
                        let existing = self.load(key);
                        if let Some(hit) = self.fresh_hit(key, existing.as_ref()) {
                            return Ok(hit);
                        }
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(key.to_string(), rx);
                        break (tx, existing);
                    }
                }
            };

            match self.wait(key, rx).await {
                Some(outcome) => return outcome,
                None => tracing::debug!(
                    "{} fetch for {} was abandoned; electing a new leader",
                    self.name,
                    key
                ),
            }
        };

        tracing::debug!("{} cache miss for {}", self.name, key);
        let mut guard = InFlightGuard {
            tier: self,
            key,
            armed: true,
        };

        let outcome = self.settle(key, fetch().await, stale);

        guard.release();
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    fn fresh_hit(&self, key: &str, entry: Option<&CacheEntry>) -> Option<CacheLookup> {
        let entry = entry?;
        if !entry.is_fresh(self.clock.now(), self.ttl) {
            return None;
        }
        tracing::debug!("{} cache hit for {}", self.name, key);
        Some(CacheLookup {
            snapshot: entry.value.as_cached(),
            fresh: false,
        })
    }

    /// Leader's outcome, or `None` when the leader went away without one.
    async fn wait(
        &self,
        key: &str,
        mut rx: watch::Receiver<Option<FetchOutcome>>,
    ) -> Option<FetchOutcome> {
        tracing::debug!("{} joining in-flight fetch for {}", self.name, key);
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome
    }

    /// Store a success, or decide between a degraded fallback and the error.
    fn settle(
        &self,
        key: &str,
        result: Result<WeatherSnapshot, WeatherError>,
        stale: Option<CacheEntry>,
    ) -> FetchOutcome {
        match result {
            Ok(snapshot) => {
                if !snapshot.degraded {
                    self.save(CacheEntry {
                        key: key.to_string(),
                        value: snapshot.clone().normalized(),
                        stored_at: self.clock.now(),
                    });
                }
                let fresh = !snapshot.degraded;
                Ok(CacheLookup { snapshot, fresh })
            }
            Err(e) => match stale {
                Some(entry) if self.serve_stale_on_error && e.is_retryable() => {
                    tracing::warn!(
                        "{} refresh for {} failed ({}); serving entry stored at {}",
                        self.name,
                        key,
                        e,
                        entry.stored_at
                    );
                    let mut snapshot = entry.value.as_cached();
                    snapshot.degraded = true;
                    Ok(CacheLookup {
                        snapshot,
                        fresh: false,
                    })
                }
                _ => Err(e),
            },
        }
    }

    /// Current entry for `key`, fresh or not.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.load(key)
    }

    /// Drop the entry for `key`; the next lookup fetches.
    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!("{} cache remove failed for {}: {:#}", self.name, key, e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("{} cache clear failed: {:#}", self.name, e);
        }
    }

    /// Number of keys with a fetch currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        match self.store.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("{} cache read failed for {}: {:#}", self.name, key, e);
                None
            }
        }
    }

    fn save(&self, entry: CacheEntry) {
        if let Err(e) = self.store.save(&entry) {
            tracing::warn!("{} cache write failed for {}: {:#}", self.name, entry.key, e);
        }
    }
}

/// Clears a leader's in-flight slot, including when the leader is dropped
/// mid-fetch. Waiters then see the channel close and elect a new leader.
struct InFlightGuard<'a> {
    tier: &'a CacheTier,
    key: &'a str,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn release(&mut self) {
        if self.armed {
            self.tier.in_flight.lock().remove(self.key);
            self.armed = false;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
