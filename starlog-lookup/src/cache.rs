//! TTL cache in front of a [`RemoteLookup`] client.
//!
//! Keys are `(lowercased name, category)`; each category has its own TTL.
//! A live entry answers without touching the network. A miss or expired
//! entry triggers exactly one remote call from the calling task; concurrent
//! callers may race and fetch redundantly, which is harmless because the
//! last write wins with a fresh timestamp.
//!
//! Remote failures are absorbed: the caller gets the empty answer, the
//! cache keeps whatever it had, and the failure is recorded as the
//! process-wide last error. The next successful fetch clears it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::RemoteLookup;
use crate::error::LookupError;
use crate::types::{BodyRecord, SearchHit, SystemRecord, Valuation};

/// What kind of answer an entry holds; part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Single-system records.
    System,
    /// Body lists.
    Bodies,
    /// System valuations.
    Valuation,
    /// Body counts.
    BodyCount,
    /// Search results (keyed by the query prefix).
    Search,
}

/// Per-category TTLs, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// TTL for system records.
    #[serde(default = "default_long_ttl")]
    pub system_ttl_secs: u64,
    /// TTL for body lists.
    #[serde(default = "default_long_ttl")]
    pub bodies_ttl_secs: u64,
    /// TTL for valuations.
    #[serde(default = "default_valuation_ttl")]
    pub valuation_ttl_secs: u64,
    /// TTL for body counts.
    #[serde(default = "default_long_ttl")]
    pub body_count_ttl_secs: u64,
    /// TTL for search results.
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            system_ttl_secs: default_long_ttl(),
            bodies_ttl_secs: default_long_ttl(),
            valuation_ttl_secs: default_valuation_ttl(),
            body_count_ttl_secs: default_long_ttl(),
            search_ttl_secs: default_search_ttl(),
        }
    }
}

fn default_long_ttl() -> u64 {
    3_600
}
fn default_valuation_ttl() -> u64 {
    1_800
}
fn default_search_ttl() -> u64 {
    300
}

impl LookupConfig {
    fn ttl(&self, category: Category) -> Duration {
        let secs = match category {
            Category::System => self.system_ttl_secs,
            Category::Bodies => self.bodies_ttl_secs,
            Category::Valuation => self.valuation_ttl_secs,
            Category::BodyCount => self.body_count_ttl_secs,
            Category::Search => self.search_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone)]
enum Payload {
    System(Option<SystemRecord>),
    Bodies(Vec<BodyRecord>),
    Valuation(Option<Valuation>),
    BodyCount(Option<u32>),
    Search(Vec<SearchHit>),
}

#[derive(Debug, Clone)]
struct Entry {
    fetched_at: Instant,
    payload: Payload,
}

/// The most recent remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// Failure description.
    pub message: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Cache counters and health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held (live or expired, until swept).
    pub entries: usize,
    /// Answers served from a live entry.
    pub hits: u64,
    /// Answers that required a remote call.
    pub misses: u64,
    /// Entries removed by sweeps and invalidations.
    pub evictions: u64,
    /// Most recent remote failure, if the last fetch attempt failed.
    pub last_error: Option<LastError>,
}

/// TTL cache over a remote lookup client.
pub struct LookupCache<C> {
    client: C,
    config: LookupConfig,
    entries: DashMap<(String, Category), Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

impl<C: RemoteLookup> LookupCache<C> {
    /// Wrap `client` with the given TTL configuration.
    #[must_use]
    pub fn new(client: C, config: LookupConfig) -> Self {
        Self {
            client,
            config,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// System record for `name`; `None` when unknown or the remote failed.
    pub async fn system(&self, name: &str) -> Option<SystemRecord> {
        let key = cache_key(name, Category::System);
        if let Some(Payload::System(cached)) = self.live(&key) {
            return cached;
        }
        match self.client.system(name).await {
            Ok(record) => {
                self.store(key, Payload::System(record.clone()));
                record
            }
            Err(err) => {
                self.record_failure(&err);
                None
            }
        }
    }

    /// Bodies of `system`; empty when unknown or the remote failed.
    pub async fn bodies(&self, system: &str) -> Vec<BodyRecord> {
        let key = cache_key(system, Category::Bodies);
        if let Some(Payload::Bodies(cached)) = self.live(&key) {
            return cached;
        }
        match self.client.bodies(system).await {
            Ok(bodies) => {
                self.store(key, Payload::Bodies(bodies.clone()));
                bodies
            }
            Err(err) => {
                self.record_failure(&err);
                Vec::new()
            }
        }
    }

    /// Valuation of `system`; `None` when unknown or the remote failed.
    pub async fn valuation(&self, system: &str) -> Option<Valuation> {
        let key = cache_key(system, Category::Valuation);
        if let Some(Payload::Valuation(cached)) = self.live(&key) {
            return cached;
        }
        match self.client.valuation(system).await {
            Ok(valuation) => {
                self.store(key, Payload::Valuation(valuation));
                valuation
            }
            Err(err) => {
                self.record_failure(&err);
                None
            }
        }
    }

    /// Body count of `system`; `None` when unknown or the remote failed.
    pub async fn body_count(&self, system: &str) -> Option<u32> {
        let key = cache_key(system, Category::BodyCount);
        if let Some(Payload::BodyCount(cached)) = self.live(&key) {
            return cached;
        }
        match self.client.body_count(system).await {
            Ok(count) => {
                self.store(key, Payload::BodyCount(count));
                count
            }
            Err(err) => {
                self.record_failure(&err);
                None
            }
        }
    }

    /// Search hits for `prefix`; empty when the remote failed.
    pub async fn search(&self, prefix: &str) -> Vec<SearchHit> {
        let key = cache_key(prefix, Category::Search);
        if let Some(Payload::Search(cached)) = self.live(&key) {
            return cached;
        }
        match self.client.search(prefix).await {
            Ok(hits) => {
                self.store(key, Payload::Search(hits.clone()));
                hits
            }
            Err(err) => {
                self.record_failure(&err);
                Vec::new()
            }
        }
    }

    /// Drop every entry of one category.
    pub fn invalidate(&self, category: Category) {
        let before = self.entries.len();
        self.entries.retain(|(_, c), _| *c != category);
        let removed = before - self.entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(?category, removed, "cache category invalidated");
    }

    /// Drop everything.
    pub fn invalidate_all(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(removed, "cache cleared");
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(_, category), entry| entry.fetched_at.elapsed() < self.config.ttl(*category));
        let removed = before - self.entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Current counters and last remote failure.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }

    // ------------------------------------------------------------------

    fn live(&self, key: &(String, Category)) -> Option<Payload> {
        if let Some(entry) = self.entries.get(key) {
            if entry.fetched_at.elapsed() < self.config.ttl(key.1) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.payload.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn store(&self, key: (String, Category), payload: Payload) {
        self.entries.insert(
            key,
            Entry {
                fetched_at: Instant::now(),
                payload,
            },
        );
        // A success proves the remote is reachable again.
        *self.last_error.lock() = None;
    }

    fn record_failure(&self, err: &LookupError) {
        warn!(%err, "remote lookup failed");
        *self.last_error.lock() = Some(LastError {
            message: err.to_string(),
            at: Utc::now(),
        });
    }
}

fn cache_key(name: &str, category: Category) -> (String, Category) {
    (name.to_lowercase(), category)
}
