//! Bounded cache of image bytes keyed by image URL.
//!
//! Concurrent misses on the same URL share one fetch: the first caller
//! leads, later callers subscribe to its outcome. Failures are handed to
//! every waiter and never cached.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ImageCacheConfig;
use crate::FeedError;

type FetchOutcome = Result<Bytes, FeedError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

struct CacheState {
    entries: LruCache<String, Bytes>,
    total_bytes: usize,
    max_bytes: usize,
    in_flight: HashMap<String, broadcast::Sender<FetchOutcome>>,
}

impl CacheState {
    /// Stores `bytes` and returns how many other entries were evicted.
    fn insert(&mut self, key: String, bytes: Bytes) -> u64 {
        if bytes.len() > self.max_bytes {
            debug!(
                url = %key,
                size = bytes.len(),
                max = self.max_bytes,
                "image exceeds cache budget; not stored"
            );
            // An older copy under the same key would otherwise be served.
            if let Some(old) = self.entries.pop(&key) {
                self.total_bytes -= old.len();
            }
            return 0;
        }

        let mut evicted = 0;
        self.total_bytes += bytes.len();
        if let Some((old_key, old)) = self.entries.push(key.clone(), bytes) {
            self.total_bytes -= old.len();
            if old_key != key {
                evicted += 1;
            }
        }

        while self.total_bytes > self.max_bytes {
            let Some((old_key, old)) = self.entries.pop_lru() else {
                break;
            };
            debug!(url = %old_key, size = old.len(), "evicting image over byte budget");
            self.total_bytes -= old.len();
            evicted += 1;
        }
        evicted
    }
}

enum Claim {
    Hit(Bytes),
    Wait(broadcast::Receiver<FetchOutcome>),
    Lead,
}

/// Clears the in-flight slot if the leading fetch is dropped before it
/// publishes, so waiters wake up and one of them takes over.
struct InFlightGuard<'a> {
    state: &'a Mutex<CacheState>,
    key: &'a str,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.state).in_flight.remove(self.key);
            debug!(url = %self.key, "leading image fetch abandoned");
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ImageByteCache {
    state: Mutex<CacheState>,
    counters: CacheCounters,
}

impl ImageByteCache {
    pub fn new(config: &ImageCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                total_bytes: 0,
                max_bytes: config.max_bytes.max(1),
                in_flight: HashMap::new(),
            }),
            counters: CacheCounters::default(),
        }
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        let found = lock(&self.state).entries.get(url).cloned();
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, url: impl Into<String>, bytes: Bytes) {
        let evicted = lock(&self.state).insert(url.into(), bytes);
        self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub fn contains(&self, url: &str) -> bool {
        lock(&self.state).entries.contains(url)
    }

    pub fn remove(&self, url: &str) -> Option<Bytes> {
        let mut state = lock(&self.state);
        let removed = state.entries.pop(url);
        if let Some(bytes) = &removed {
            state.total_bytes -= bytes.len();
        }
        removed
    }

    /// Drops every stored entry. Hosts call this on a memory warning.
    /// Fetches already in flight still complete and store their result.
    pub fn purge(&self) {
        let mut state = lock(&self.state);
        let dropped = state.entries.len();
        state.entries.clear();
        state.total_bytes = 0;
        info!(dropped, "image cache purged");
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        lock(&self.state).total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let state = lock(&self.state);
            (state.entries.len(), state.total_bytes)
        };
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }

    /// Returns the cached bytes for `url`, or runs `fetcher` once to get
    /// them. Callers that miss while a fetch for the same URL is running
    /// wait for that fetch instead of starting another.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, fetcher: F) -> Result<Bytes, FeedError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Bytes, FeedError>>,
    {
        loop {
            match self.claim(url) {
                Claim::Hit(bytes) => return Ok(bytes),
                Claim::Lead => return self.lead(url, fetcher).await,
                Claim::Wait(mut rx) => match rx.recv().await {
                    Ok(outcome) => return outcome,
                    Err(_) => continue,
                },
            }
        }
    }

    fn claim(&self, url: &str) -> Claim {
        let mut state = lock(&self.state);

        if let Some(bytes) = state.entries.get(url) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Claim::Hit(bytes.clone());
        }

        if let Some(leader) = state.in_flight.get(url) {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            return Claim::Wait(leader.subscribe());
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(1);
        state.in_flight.insert(url.to_string(), tx);
        Claim::Lead
    }

    async fn lead<F, Fut>(&self, url: &str, fetcher: F) -> FetchOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let guard = InFlightGuard {
            state: &self.state,
            key: url,
            armed: true,
        };
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);

        let outcome = fetcher(url.to_string()).await;

        {
            let mut state = lock(&self.state);
            match &outcome {
                Ok(bytes) => {
                    let evicted = state.insert(url.to_string(), bytes.clone());
                    self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
                }
                Err(e) => debug!(url, error = %e, "image fetch failed; nothing cached"),
            }
            if let Some(waiters) = state.in_flight.remove(url) {
                // No receivers just means nobody else asked.
                let _ = waiters.send(outcome.clone());
            }
        }
        guard.disarm();
        outcome
    }
}

impl Default for ImageByteCache {
    fn default() -> Self {
        Self::new(&ImageCacheConfig::default())
    }
}
