//! semio-registry
//!
//! Discovers application identities from stored documents and resolves raw
//! identifiers to canonical ones. The merge itself lives in [`alias`] and is
//! free of store I/O.
pub mod alias;

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use semio_core::config::Settings;
use semio_core::{ApplicationRecord, Error, Result, StoreFilter, VectorStore};

pub use alias::{merge, AliasPolicy};

#[derive(Default)]
struct Snapshot {
    records: Vec<ApplicationRecord>,
    /// Every raw identifier (canonical ids included) -> position in `records`.
    index: HashMap<String, usize>,
}

impl Snapshot {
    fn new(records: Vec<ApplicationRecord>) -> Self {
        let mut index = HashMap::new();
        for (i, r) in records.iter().enumerate() {
            index.insert(r.canonical_id.clone(), i);
            for alias in &r.aliases { index.insert(alias.clone(), i); }
        }
        Self { records, index }
    }
}

pub struct ApplicationRegistry {
    store: Arc<dyn VectorStore>,
    policy: AliasPolicy,
    timeout: Duration,
    snapshot: RwLock<Snapshot>,
}

impl ApplicationRegistry {
    pub fn new(store: Arc<dyn VectorStore>, policy: AliasPolicy, timeout: Duration) -> Self {
        Self { store, policy, timeout, snapshot: RwLock::new(Snapshot::default()) }
    }

    pub fn from_settings(store: Arc<dyn VectorStore>, settings: &Settings) -> Result<Self> {
        Ok(Self::new(store, AliasPolicy::from_settings(&settings.registry)?, settings.store.timeout()))
    }

    /// Scan the identifying columns of every stored document and rebuild the
    /// canonical application set.
    ///
    /// Counts are recomputed on every call. An empty store yields an empty
    /// set; an unreachable one fails with `Error::Discovery` and leaves the
    /// previous snapshot in place.
    pub fn discover(&self) -> Result<Vec<ApplicationRecord>> {
        let documents = self
            .store
            .identities(&StoreFilter::all(), self.timeout)
            .map_err(|source| Error::Discovery { source })?;
        let records = alias::merge(&documents, &self.policy);
        for r in &records {
            debug!(app = %r.canonical_id, aliases = ?r.aliases, documents = r.total_documents(), "application discovered");
        }
        info!(applications = records.len(), documents = documents.len(), "discovery complete");
        *self.snapshot.write() = Snapshot::new(records.clone());
        Ok(records)
    }

    pub fn resolve(&self, raw_id: &str) -> Result<String> {
        self.record(raw_id).map(|r| r.canonical_id)
    }

    pub fn record(&self, raw_id: &str) -> Result<ApplicationRecord> {
        let snapshot = self.snapshot.read();
        snapshot
            .index
            .get(raw_id)
            .map(|&i| snapshot.records[i].clone())
            .ok_or_else(|| Error::UnknownApplication { id: raw_id.to_string() })
    }

    /// Records from the last successful discovery, sorted by canonical id.
    pub fn records(&self) -> Vec<ApplicationRecord> { self.snapshot.read().records.clone() }

    /// Inverse of `resolve`: every raw identifier that resolves to `canonical_id`.
    pub fn aliases_of(&self, canonical_id: &str) -> Result<BTreeSet<String>> {
        let record = self.record(canonical_id)?;
        if record.canonical_id != canonical_id {
            return Err(Error::UnknownApplication { id: canonical_id.to_string() });
        }
        let mut ids = record.aliases;
        ids.insert(record.canonical_id);
        Ok(ids)
    }
}
