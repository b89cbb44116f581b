//! Per-application working sets of embedded records.
//!
//! One entry per `(canonical application id, document kind)`. Entries are
//! immutable snapshots shared as `Arc<CacheEntry>`; a refresh swaps the whole
//! entry, never patches it. Each key has its own mutex, so concurrent misses
//! on one key perform a single store load while other keys proceed.
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use semio_core::config::Settings;
use semio_core::{ApplicationRecord, DocumentKind, EmbeddingRecord, EmbeddingSchema, Error, Result, StoreResult, VectorStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub application_id: String,
    pub kind: DocumentKind,
}

impl CacheKey {
    pub fn new(application_id: impl Into<String>, kind: DocumentKind) -> Self {
        Self { application_id: application_id.into(), kind }
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    pub application_id: String,
    pub kind: DocumentKind,
    /// Materialized records in store order, at most `limit` of them.
    pub records: Vec<EmbeddingRecord>,
    /// Matching records in the store when this entry was loaded.
    pub total: usize,
    pub limit: usize,
    pub loaded_at: Instant,
    pub loaded_on: DateTime<Utc>,
}

impl CacheEntry {
    pub fn loaded(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// True when the store holds records that were not materialized.
    pub fn is_partial(&self) -> bool { self.loaded() < self.total }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub application_id: String,
    pub kind: DocumentKind,
    pub total: usize,
    pub loaded: usize,
    pub loaded_on: DateTime<Utc>,
    pub age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub limit: usize,
    pub ttl: Duration,
    /// Bound on every store call made by the cache.
    pub timeout: Duration,
}

impl CachePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { limit: settings.cache.limit, ttl: settings.cache.ttl(), timeout: settings.store.timeout() }
    }
}

impl Default for CachePolicy {
    fn default() -> Self { Self::from_settings(&Settings::default()) }
}

type Slot = Arc<Mutex<Option<Arc<CacheEntry>>>>;

pub struct EmbeddingCache {
    store: Arc<dyn VectorStore>,
    policy: CachePolicy,
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn VectorStore>, policy: CachePolicy) -> Self {
        Self { store, policy, slots: RwLock::new(HashMap::new()) }
    }

    pub fn policy(&self) -> &CachePolicy { &self.policy }

    /// Dimensionality of every vector held by this cache.
    pub fn schema(&self) -> EmbeddingSchema { self.store.schema() }

    fn slot(&self, key: &CacheKey) -> Slot {
        if let Some(slot) = self.slots.read().get(key) { return slot.clone(); }
        self.slots.write().entry(key.clone()).or_default().clone()
    }

    /// Load up to `limit` records for `app`/`kind`, replacing any cached entry.
    pub fn load(&self, app: &ApplicationRecord, kind: DocumentKind, limit: usize) -> Result<Arc<CacheEntry>> {
        if limit == 0 { return Err(Error::invalid_argument("limit", "must be positive")); }
        let slot = self.slot(&CacheKey::new(&app.canonical_id, kind));
        let mut guard = slot.lock();
        self.reload(&mut guard, app, kind, limit)
    }

    /// The cached entry if it is fresh, otherwise a blocking reload.
    ///
    /// Fresh means the TTL has not elapsed and the store still reports the
    /// total recorded at load time. If the store cannot be reached the
    /// previous entry stays in place (see [`EmbeddingCache::peek`]) and the
    /// failure is returned.
    pub fn get(&self, app: &ApplicationRecord, kind: DocumentKind) -> Result<Arc<CacheEntry>> {
        let slot = self.slot(&CacheKey::new(&app.canonical_id, kind));
        let mut guard = slot.lock();
        let limit = match guard.as_ref() {
            Some(entry) if entry.loaded_at.elapsed() < self.policy.ttl => {
                match self.store.count(&app.filter(kind), self.policy.timeout) {
                    Ok(total) if total == entry.total => return Ok(entry.clone()),
                    Ok(total) => {
                        debug!(app = %app.canonical_id, %kind, was = entry.total, now = total, "document count drifted");
                        entry.limit
                    }
                    Err(source) => {
                        warn!(app = %app.canonical_id, %kind, error = %source, "freshness check failed; retaining stale entry");
                        return Err(Error::Reload { application_id: app.canonical_id.clone(), kind, source });
                    }
                }
            }
            Some(entry) => {
                debug!(app = %app.canonical_id, %kind, "ttl elapsed");
                entry.limit
            }
            None => self.policy.limit,
        };
        self.reload(&mut guard, app, kind, limit)
    }

    /// The current entry, fresh or not, without touching the store.
    pub fn peek(&self, application_id: &str, kind: DocumentKind) -> Option<Arc<CacheEntry>> {
        let slot = self.slots.read().get(&CacheKey::new(application_id, kind)).cloned()?;
        let entry = slot.lock().clone();
        entry
    }

    /// Drop one entry; the next `get` reloads it. Returns whether one existed.
    pub fn invalidate(&self, application_id: &str, kind: DocumentKind) -> bool {
        let Some(slot) = self.slots.read().get(&CacheKey::new(application_id, kind)).cloned() else { return false };
        let existed = slot.lock().take().is_some();
        if existed { debug!(app = application_id, %kind, "entry invalidated"); }
        existed
    }

    pub fn invalidate_application(&self, application_id: &str) -> usize {
        DocumentKind::ALL.into_iter().filter(|kind| self.invalidate(application_id, *kind)).count()
    }

    /// Forget every entry.
    pub fn reset(&self) {
        self.slots.write().clear();
        info!("embedding cache reset");
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        let slots: Vec<(CacheKey, Slot)> = self.slots.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut stats: Vec<CacheStats> = slots
            .into_iter()
            .filter_map(|(key, slot)| {
                let entry = slot.lock().clone()?;
                Some(CacheStats {
                    application_id: key.application_id,
                    kind: key.kind,
                    total: entry.total,
                    loaded: entry.loaded(),
                    loaded_on: entry.loaded_on,
                    age: entry.loaded_at.elapsed(),
                })
            })
            .collect();
        stats.sort_by(|a, b| (&a.application_id, a.kind).cmp(&(&b.application_id, b.kind)));
        stats
    }

    fn reload(&self, guard: &mut Option<Arc<CacheEntry>>, app: &ApplicationRecord, kind: DocumentKind, limit: usize) -> Result<Arc<CacheEntry>> {
        match self.fetch(app, kind, limit) {
            Ok(entry) => {
                info!(app = %app.canonical_id, %kind, loaded = entry.loaded(), total = entry.total, "cache entry loaded");
                let entry = Arc::new(entry);
                *guard = Some(entry.clone());
                Ok(entry)
            }
            Err(source) => {
                if guard.is_some() {
                    warn!(app = %app.canonical_id, %kind, error = %source, "reload failed; retaining stale entry");
                }
                Err(Error::Reload { application_id: app.canonical_id.clone(), kind, source })
            }
        }
    }

    fn fetch(&self, app: &ApplicationRecord, kind: DocumentKind, limit: usize) -> StoreResult<CacheEntry> {
        let filter = app.filter(kind);
        let total = self.store.count(&filter, self.policy.timeout)?;
        let mut records = self.store.query(&filter.with_limit(limit), self.policy.timeout)?;
        records.truncate(limit);
        let schema = self.store.schema();
        for r in &mut records {
            r.check_stored(&schema)?;
            r.application_id.clone_from(&app.canonical_id);
        }
        Ok(CacheEntry {
            application_id: app.canonical_id.clone(),
            kind,
            records,
            total,
            limit,
            loaded_at: Instant::now(),
            loaded_on: Utc::now(),
        })
    }
}
