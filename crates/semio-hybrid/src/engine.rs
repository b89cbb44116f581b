use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use semio_core::config::Settings;
use semio_core::{ApplicationProfile, ApplicationRecord, DocumentKind, EmbeddingRecord, EmbeddingSchema, Error, QueryResult, Result, Signal, VectorField};
use semio_registry::ApplicationRegistry;
use semio_text::{LexicalQuery, Lexicon};
use semio_vector::EmbeddingCache;

use crate::fusion::{self, FusionStrategy};
use crate::mode::SearchMode;
use crate::weights::Weights;

/// One `search` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub application_id: String,
    pub text: String,
    pub vectors: BTreeMap<VectorField, Vec<f32>>,
    pub weights: Weights,
    /// Falls back to the engine default when unset.
    pub top_k: Option<usize>,
    /// Kinds searched, in this order. Empty means every kind.
    pub kinds: Vec<DocumentKind>,
}

impl SearchRequest {
    pub fn new(application_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            text: text.into(),
            vectors: BTreeMap::new(),
            weights: Weights::new(),
            top_k: None,
            kinds: DocumentKind::ALL.to_vec(),
        }
    }

    /// Request whose mode is detected from the query wording.
    pub fn smart(application_id: impl Into<String>, text: impl Into<String>) -> Self {
        let req = Self::new(application_id, text);
        let mode = SearchMode::detect(&req.text);
        req.mode(mode)
    }

    pub fn vector(mut self, field: VectorField, vector: Vec<f32>) -> Self {
        self.vectors.insert(field, vector);
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = DocumentKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Replace weights and kinds with the mode's profile.
    pub fn mode(self, mode: SearchMode) -> Self { self.weights(mode.weights()).kinds(mode.kinds().iter().copied()) }

    /// Derive the `target` query vector by fusing the other supplied vectors.
    pub fn fused(mut self, target: VectorField, strategy: &FusionStrategy) -> Result<Self> {
        let sources: BTreeMap<VectorField, Vec<f32>> =
            self.vectors.iter().filter(|(f, _)| **f != target).map(|(f, v)| (*f, v.clone())).collect();
        let fused = fusion::fuse(&sources, strategy)?;
        self.vectors.insert(target, fused);
        Ok(self)
    }
}

pub struct HybridSearchEngine {
    registry: Arc<ApplicationRegistry>,
    cache: Arc<EmbeddingCache>,
    lexicon: Lexicon,
    default_top_k: usize,
    profiles: BTreeMap<String, ApplicationProfile>,
}

impl HybridSearchEngine {
    pub const DEFAULT_TOP_K: usize = 10;

    /// Query vectors are checked against the dimensionality of the vectors
    /// the cache serves, which is whatever the backing store holds.
    pub fn new(registry: Arc<ApplicationRegistry>, cache: Arc<EmbeddingCache>) -> Self {
        Self { registry, cache, lexicon: Lexicon::new(), default_top_k: Self::DEFAULT_TOP_K, profiles: BTreeMap::new() }
    }

    pub fn from_settings(registry: Arc<ApplicationRegistry>, cache: Arc<EmbeddingCache>, settings: &Settings) -> Self {
        let stored = cache.schema();
        if stored != settings.schema {
            warn!(configured = ?settings.schema, stored = ?stored, "configured schema differs from the store; using the store's");
        }
        let lexicon = if settings.search.stop_words { Lexicon::with_stop_words() } else { Lexicon::new() };
        Self::new(registry, cache)
            .with_lexicon(lexicon)
            .with_default_top_k(settings.search.default_top_k)
            .with_profiles(settings.applications.clone())
    }

    /// Profiles keyed by any identifier of their application.
    pub fn with_profiles(mut self, profiles: BTreeMap<String, ApplicationProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn with_default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> { &self.cache }

    pub fn registry(&self) -> &Arc<ApplicationRegistry> { &self.registry }

    pub fn schema(&self) -> EmbeddingSchema { self.cache.schema() }

    /// The profile configured under the canonical id or, failing that, under
    /// the smallest alias that has one.
    pub fn profile(&self, app: &ApplicationRecord) -> Option<&ApplicationProfile> {
        self.profiles
            .get(&app.canonical_id)
            .or_else(|| app.aliases.iter().find_map(|alias| self.profiles.get(alias)))
    }

    /// Rank the application's cached records against the request.
    ///
    /// Arguments are checked before anything is loaded or scored. Query
    /// vectors for variants the application's profile does not enable are
    /// ignored; without any remaining the ranking is purely lexical. Results
    /// are ordered by score, ties keeping cache order (kinds in request order).
    pub fn search(&self, req: &SearchRequest) -> Result<Vec<QueryResult>> {
        let top_k = req.top_k.unwrap_or(self.default_top_k);
        if top_k == 0 { return Err(Error::invalid_argument("top_k", "must be a positive integer")); }
        req.weights.validate()?;
        check_vectors(&self.cache.schema(), &req.vectors)?;
        let app = self.registry.record(&req.application_id)?;

        let profile = self.profile(&app);
        let vectors: BTreeMap<VectorField, &[f32]> = req
            .vectors
            .iter()
            .filter(|(field, _)| {
                let enabled = profile.map_or(true, |p| p.enables(**field));
                if !enabled { debug!(app = %app.canonical_id, %field, "variant not enabled for application"); }
                enabled
            })
            .map(|(field, v)| (*field, v.as_slice()))
            .collect();

        let active: Vec<Signal> = vectors.keys().map(|f| Signal::Vector(*f)).chain([Signal::Lexical]).collect();
        let weights = req.weights.effective(&active);
        let scored: Vec<(VectorField, &[f32], f32)> = vectors
            .iter()
            .filter_map(|(field, v)| {
                let w = weights.get(&Signal::Vector(*field)).copied().unwrap_or(0.0);
                (w > 0.0).then_some((*field, *v, w))
            })
            .collect();
        let lexical_weight = weights.get(&Signal::Lexical).copied().unwrap_or(0.0);
        let query = self.lexicon.query(&req.text);

        let mut results = Vec::new();
        for kind in dedup_kinds(&req.kinds) {
            let entry = self.cache.get(&app, kind)?;
            if entry.is_partial() {
                debug!(app = %app.canonical_id, %kind, loaded = entry.loaded(), total = entry.total, "searching partial working set");
            }
            for record in &entry.records {
                results.push(self.score(record, &scored, &query, lexical_weight)?);
            }
        }

        let candidates = results.len();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        debug!(app = %app.canonical_id, candidates, returned = results.len(), lexical_only = scored.is_empty(), "search complete");
        Ok(results)
    }

    /// Mean cosine between two variants over the application's working set,
    /// sampling at most `sample_size` records per variant.
    pub fn cross_similarity(&self, application_id: &str, kind: DocumentKind, a: VectorField, b: VectorField, sample_size: usize) -> Result<f32> {
        let app = self.registry.record(application_id)?;
        let entry = self.cache.get(&app, kind)?;
        fusion::cross_similarity(&entry.records, a, b, sample_size)
    }

    fn score(&self, record: &EmbeddingRecord, scored: &[(VectorField, &[f32], f32)], query: &LexicalQuery, lexical_weight: f32) -> Result<QueryResult> {
        let mut breakdown = BTreeMap::new();
        let mut score = 0.0;
        for (field, q, w) in scored {
            // records without this field contribute zero
            let sim = match record.vectors.get(*field) {
                Some(v) => cosine(q, v).ok_or(Error::DimensionMismatch { field: *field, expected: v.len(), actual: q.len() })?,
                None => 0.0,
            };
            breakdown.insert(Signal::Vector(*field), sim);
            score += w * sim;
        }
        let lexical = query.score(&self.lexicon, &record.chunk_text);
        breakdown.insert(Signal::Lexical, lexical);
        score += lexical_weight * lexical;

        Ok(QueryResult {
            id: record.id.clone(),
            kind: record.kind,
            chunk_text: record.chunk_text.clone(),
            metadata: record.metadata.clone(),
            score,
            score_breakdown: breakdown,
        })
    }
}

fn dedup_kinds(requested: &[DocumentKind]) -> Vec<DocumentKind> {
    let requested = if requested.is_empty() { &DocumentKind::ALL[..] } else { requested };
    let mut kinds: Vec<DocumentKind> = Vec::new();
    for kind in requested {
        if !kinds.contains(kind) { kinds.push(*kind); }
    }
    kinds
}

fn check_vectors(schema: &EmbeddingSchema, vectors: &BTreeMap<VectorField, Vec<f32>>) -> Result<()> {
    for (field, v) in vectors {
        let expected = schema.dim(*field);
        if v.len() != expected {
            return Err(Error::DimensionMismatch { field: *field, expected, actual: v.len() });
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(Error::invalid_argument("query_vector", format!("'{field}' contains non-finite values")));
        }
    }
    Ok(())
}

/// Cosine similarity; zero when either vector has zero norm, `None` when the
/// lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() { return None; }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { return Some(0.0); }
    Some((dot / (na.sqrt() * nb.sqrt())) as f32)
}

#[cfg(test)]
mod tests {
    use super::cosine;

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), Some(0.0));
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 3.0]).unwrap().abs() < 1e-6);
    }

    #[test]
    fn cosine_refuses_mismatched_lengths() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
        assert_eq!(cosine(&[1.0; 768], &[1.0, 0.0]), None);
    }
}
