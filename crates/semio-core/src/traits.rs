use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{Result, StoreResult};
use crate::types::{DocumentIdentity, DocumentKind, EmbeddingRecord, EmbeddingSchema};

/// Selection predicate understood by every `VectorStore`.
///
/// A document matches when its application id is in `application_ids`, or its
/// source is in `sources` and its application id is not in `excluded_ids`. Its
/// kind must equal `kind` when one is given. Empty id and source sets select
/// every application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFilter {
    pub application_ids: BTreeSet<String>,
    pub sources: BTreeSet<String>,
    /// Identifiers never selected through a shared source.
    pub excluded_ids: BTreeSet<String>,
    pub kind: Option<DocumentKind>,
    pub limit: Option<usize>,
}

impl StoreFilter {
    pub fn all() -> Self { Self::default() }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The same predicate without a row limit, used for total counts.
    pub fn unlimited(&self) -> Self { Self { limit: None, ..self.clone() } }

    pub fn matches(&self, record: &EmbeddingRecord) -> bool {
        let unscoped = self.application_ids.is_empty() && self.sources.is_empty();
        let owned = unscoped
            || self.application_ids.contains(&record.application_id)
            || (record.source.as_ref().is_some_and(|s| self.sources.contains(s))
                && !self.excluded_ids.contains(&record.application_id));
        owned && self.kind.map_or(true, |k| k == record.kind)
    }
}

/// Persisted collections of embedded documents.
///
/// Implementations return records in insertion order and must give up with
/// `StoreError::Timeout` rather than block past `timeout`. A stored document
/// that does not satisfy `schema()` is reported as `StoreError::Corrupt`.
pub trait VectorStore: Send + Sync {
    /// Dimensionality the stored vectors were written with.
    fn schema(&self) -> EmbeddingSchema;

    fn query(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<Vec<EmbeddingRecord>>;

    fn count(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<usize>;

    /// Identifying columns of the matching documents, in insertion order.
    ///
    /// The default goes through `query`; backends that can project columns
    /// should override it so text and vectors are never materialized.
    fn identities(&self, filter: &StoreFilter, timeout: Duration) -> StoreResult<Vec<DocumentIdentity>> {
        Ok(self.query(filter, timeout)?.iter().map(DocumentIdentity::from).collect())
    }
}

/// Opaque credential lookup.
pub trait SecretProvider: Send + Sync {
    fn get_secret(&self, name: &str) -> Result<String>;
}
