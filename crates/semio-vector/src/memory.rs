//! In-process `VectorStore` keeping records in insertion order.
use parking_lot::RwLock;
use std::time::Duration;

use semio_core::{DocumentIdentity, EmbeddingRecord, EmbeddingSchema, Result, StoreFilter, StoreResult, VectorStore};

pub struct MemoryVectorStore {
    schema: EmbeddingSchema,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryVectorStore {
    pub fn new(schema: EmbeddingSchema) -> Self { Self { schema, records: RwLock::new(Vec::new()) } }

    pub fn insert(&self, record: EmbeddingRecord) -> Result<()> {
        record.validate(&self.schema)?;
        self.records.write().push(record);
        Ok(())
    }

    /// Insert every record or none of them.
    pub fn extend(&self, records: impl IntoIterator<Item = EmbeddingRecord>) -> Result<usize> {
        let records: Vec<EmbeddingRecord> = records.into_iter().collect();
        for r in &records { r.validate(&self.schema)?; }
        let n = records.len();
        self.records.write().extend(records);
        Ok(n)
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        records.len() != before
    }

    pub fn len(&self) -> usize { self.records.read().len() }

    pub fn is_empty(&self) -> bool { self.records.read().is_empty() }
}

impl VectorStore for MemoryVectorStore {
    fn schema(&self) -> EmbeddingSchema { self.schema }

    fn query(&self, filter: &StoreFilter, _timeout: Duration) -> StoreResult<Vec<EmbeddingRecord>> {
        let records = self.records.read();
        let matching = records.iter().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn count(&self, filter: &StoreFilter, _timeout: Duration) -> StoreResult<usize> {
        Ok(self.records.read().iter().filter(|r| filter.matches(r)).count())
    }

    fn identities(&self, filter: &StoreFilter, _timeout: Duration) -> StoreResult<Vec<DocumentIdentity>> {
        let records = self.records.read();
        let matching = records.iter().filter(|r| filter.matches(r)).map(DocumentIdentity::from);
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
