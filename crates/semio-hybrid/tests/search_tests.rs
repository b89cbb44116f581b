use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use proptest::prelude::*;

use semio_core::config::Settings;
use semio_core::{
    ApplicationProfile, DocumentKind, EmbeddingRecord, EmbeddingSchema, Error, Signal, StoreError, StoreFilter, StoreResult, VectorField, VectorStore,
};
use semio_hybrid::{FusionStrategy, HybridSearchEngine, SearchMode, SearchRequest, Weights};
use semio_registry::ApplicationRegistry;
use semio_vector::{CachePolicy, EmbeddingCache, MemoryVectorStore};

struct Fixture {
    engine: HybridSearchEngine,
    store: Arc<MemoryVectorStore>,
}

fn fixture(dim: usize, records: Vec<EmbeddingRecord>) -> Result<Fixture> {
    let store = Arc::new(MemoryVectorStore::new(EmbeddingSchema::uniform(dim)));
    store.extend(records)?;
    Ok(Fixture { engine: engine_over(store.clone(), &Settings::default())?, store })
}

fn engine_over(store: Arc<dyn VectorStore>, settings: &Settings) -> Result<HybridSearchEngine> {
    let registry = Arc::new(ApplicationRegistry::from_settings(store.clone(), settings)?);
    registry.discover()?;
    let cache = Arc::new(EmbeddingCache::new(store, CachePolicy::from_settings(settings)));
    Ok(HybridSearchEngine::from_settings(registry, cache, settings))
}

/// Returns its records unchecked and reports whatever schema it was given.
struct RawStore {
    schema: EmbeddingSchema,
    records: Vec<EmbeddingRecord>,
}

impl VectorStore for RawStore {
    fn schema(&self) -> EmbeddingSchema { self.schema }

    fn query(&self, filter: &StoreFilter, _: Duration) -> StoreResult<Vec<EmbeddingRecord>> {
        Ok(self.records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn count(&self, filter: &StoreFilter, _: Duration) -> StoreResult<usize> {
        Ok(self.records.iter().filter(|r| filter.matches(r)).count())
    }
}

fn code(id: &str, text: &str, syntax: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord::new(id, "etl", DocumentKind::Code, text).with_vector(VectorField::Syntax, syntax)
}

fn ids(results: &[semio_core::QueryResult]) -> Vec<&str> { results.iter().map(|r| r.id.as_str()).collect() }

#[test]
fn lexical_only_ranks_overlapping_text_first() -> Result<()> {
    let f = fixture(2, vec![code("jwt", "authenticate jwt token", vec![1.0, 0.0]), code("csv", "parse csv rows", vec![0.0, 1.0])])?;
    let results = f.engine.search(&SearchRequest::new("etl", "csv parsing"))?;
    assert_eq!(ids(&results), vec!["csv", "jwt"]);
    assert!(results[0].score > results[1].score);
    assert_eq!(results[0].score_breakdown.get(&Signal::Lexical), Some(&0.5));
    assert_eq!(results[0].score_breakdown.len(), 1);
    Ok(())
}

#[test]
fn exact_phrase_beats_disjoint_text() -> Result<()> {
    let f = fixture(2, vec![code("a", "nothing in common here", vec![1.0, 0.0]), code("b", "load the customer ledger nightly", vec![1.0, 0.0])])?;
    let results = f.engine.search(&SearchRequest::new("etl", "customer ledger"))?;
    assert_eq!(results[0].id, "b");
    assert!(results[0].score > results[1].score);
    Ok(())
}

#[test]
fn emptied_working_set_returns_no_results() -> Result<()> {
    let f = fixture(2, vec![code("a", "parse csv rows", vec![1.0, 0.0])])?;
    assert!(f.store.remove("a"));
    assert!(f.engine.search(&SearchRequest::new("etl", "csv"))?.is_empty());
    Ok(())
}

#[test]
fn wrong_query_dimension_fails_for_every_weighting() -> Result<()> {
    let f = fixture(768, vec![code("a", "parse csv rows", vec![0.1; 768])])?;
    let weightings = [
        Weights::new(),
        Weights::new().lexical(1.0),
        Weights::new().vector(VectorField::Syntax, 0.0),
        Weights::new().vector(VectorField::Syntax, 1.0).lexical(0.0),
        Weights::new().vector(VectorField::Hybrid, 2.0),
        SearchMode::Code.weights(),
    ];
    for weights in weightings {
        let req = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![0.5; 10]).weights(weights);
        let err = f.engine.search(&req).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { field: VectorField::Syntax, expected: 768, actual: 10 }), "got {err:?}");
    }
    Ok(())
}

#[test]
fn query_dimension_follows_the_stored_vectors() -> Result<()> {
    // Settings::default() declares 768 dimensions; the store holds 2.
    let f = fixture(2, vec![code("a", "parse csv rows", vec![1.0, 0.0])])?;
    assert_eq!(f.engine.schema(), EmbeddingSchema::uniform(2));

    let fits = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![1.0, 0.0]);
    assert_eq!(ids(&f.engine.search(&fits)?), vec!["a"]);

    let wide = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![0.1; 768]);
    let err = f.engine.search(&wide).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { field: VectorField::Syntax, expected: 2, actual: 768 }), "got {err:?}");
    Ok(())
}

#[test]
fn store_misreporting_its_schema_is_an_error_not_a_truncated_score() -> Result<()> {
    let store = Arc::new(RawStore { schema: EmbeddingSchema::uniform(4), records: vec![code("a", "parse csv rows", vec![1.0, 0.0])] });
    let engine = engine_over(store, &Settings::default())?;
    let req = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![1.0, 0.0, 0.0, 0.0]);
    let err = engine.search(&req).unwrap_err();
    assert!(matches!(err, Error::Reload { source: StoreError::Corrupt { .. }, .. }), "got {err:?}");
    Ok(())
}

#[test]
fn corrupt_stored_vector_fails_the_search() -> Result<()> {
    let poisoned = code("nan", "parse csv rows", vec![f32::NAN, 0.0]);
    let store = Arc::new(RawStore { schema: EmbeddingSchema::uniform(2), records: vec![code("ok", "parse csv rows", vec![1.0, 0.0]), poisoned] });
    let engine = engine_over(store, &Settings::default())?;
    let req = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![1.0, 0.0]);
    let err = engine.search(&req).unwrap_err();
    assert!(matches!(err, Error::Reload { source: StoreError::Corrupt { ref id, .. }, .. } if id == "nan"), "got {err:?}");
    Ok(())
}

#[test]
fn profile_limits_the_scored_variants() -> Result<()> {
    let store = Arc::new(MemoryVectorStore::new(EmbeddingSchema::uniform(2)));
    store.extend(vec![code("a", "parse csv rows", vec![1.0, 0.0]).with_vector(VectorField::Domain, vec![0.0, 1.0])])?;
    let mut settings = Settings::default();
    settings.applications.insert(
        "etl".into(),
        ApplicationProfile { embedding_types: vec![VectorField::Domain], ..ApplicationProfile::default() },
    );
    let engine = engine_over(store, &settings)?;

    let req = SearchRequest::new("etl", "csv")
        .vector(VectorField::Syntax, vec![1.0, 0.0])
        .vector(VectorField::Domain, vec![0.0, 1.0]);
    let results = engine.search(&req)?;
    let breakdown = &results[0].score_breakdown;
    assert!(breakdown.contains_key(&Signal::Vector(VectorField::Domain)));
    assert!(!breakdown.contains_key(&Signal::Vector(VectorField::Syntax)));

    // disabled variants are still dimension-checked
    let wide = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![1.0; 3]);
    assert!(matches!(engine.search(&wide), Err(Error::DimensionMismatch { .. })));
    Ok(())
}

#[test]
fn fused_query_scores_the_target_variant() -> Result<()> {
    let hybrid = EmbeddingRecord::new("h", "etl", DocumentKind::Code, "export ledger").with_vector(VectorField::Hybrid, vec![1.0, 1.0]);
    let f = fixture(2, vec![hybrid, code("s", "parse csv rows", vec![1.0, 0.0])])?;
    let req = SearchRequest::new("etl", "")
        .vector(VectorField::Syntax, vec![1.0, 0.0])
        .vector(VectorField::Domain, vec![0.0, 1.0])
        .fused(VectorField::Hybrid, &FusionStrategy::Weighted(BTreeMap::new()))?
        .weights(Weights::new().vector(VectorField::Hybrid, 1.0));
    let results = f.engine.search(&req)?;
    assert_eq!(results[0].id, "h");
    let sim = results[0].score_breakdown[&Signal::Vector(VectorField::Hybrid)];
    assert!((sim - 1.0).abs() < 1e-5, "got {sim}");
    Ok(())
}

#[test]
fn cross_similarity_reads_the_working_set() -> Result<()> {
    let records = vec![
        code("a", "x", vec![1.0, 0.0]).with_vector(VectorField::Domain, vec![1.0, 0.0]),
        code("b", "y", vec![1.0, 0.0]).with_vector(VectorField::Domain, vec![0.0, 1.0]),
    ];
    let f = fixture(2, records)?;
    let sim = f.engine.cross_similarity("etl", DocumentKind::Code, VectorField::Syntax, VectorField::Domain, 100)?;
    assert!((sim - 0.5).abs() < 1e-6, "got {sim}");
    assert_eq!(f.engine.cross_similarity("etl", DocumentKind::Code, VectorField::Syntax, VectorField::Hybrid, 100)?, 0.0);
    Ok(())
}

#[test]
fn bad_arguments_are_rejected_before_lookup() -> Result<()> {
    let f = fixture(2, vec![code("a", "parse csv rows", vec![1.0, 0.0])])?;
    let zero = SearchRequest::new("nobody", "csv").top_k(0);
    assert!(matches!(f.engine.search(&zero), Err(Error::InvalidArgument { name, .. }) if name == "top_k"));

    let negative = SearchRequest::new("etl", "csv").weights(Weights::new().lexical(-1.0));
    assert!(matches!(f.engine.search(&negative), Err(Error::InvalidArgument { name, .. }) if name == "weights"));

    let nan = SearchRequest::new("etl", "csv").vector(VectorField::Syntax, vec![f32::NAN, 0.0]);
    assert!(matches!(f.engine.search(&nan), Err(Error::InvalidArgument { .. })));
    Ok(())
}

#[test]
fn unknown_application_is_reported() -> Result<()> {
    let f = fixture(2, vec![code("a", "parse csv rows", vec![1.0, 0.0])])?;
    let err = f.engine.search(&SearchRequest::new("sap_connector", "csv")).unwrap_err();
    assert!(matches!(err, Error::UnknownApplication { id } if id == "sap_connector"));
    Ok(())
}

#[test]
fn vector_signal_orders_by_cosine_and_tolerates_missing_fields() -> Result<()> {
    let sparse = EmbeddingRecord::new("sparse", "etl", DocumentKind::Code, "unrelated").with_vector(VectorField::Hybrid, vec![1.0, 0.0]);
    let f = fixture(2, vec![code("far", "x", vec![0.0, 1.0]), sparse, code("near", "y", vec![1.0, 0.1])])?;
    let req = SearchRequest::new("etl", "").vector(VectorField::Syntax, vec![1.0, 0.0]).weights(Weights::new().vector(VectorField::Syntax, 1.0));
    let results = f.engine.search(&req)?;
    assert_eq!(ids(&results), vec!["near", "far", "sparse"]);
    let sparse = &results[2];
    assert_eq!(sparse.score_breakdown.get(&Signal::Vector(VectorField::Syntax)), Some(&0.0));
    assert_eq!(sparse.score_breakdown.get(&Signal::Lexical), Some(&0.0));
    Ok(())
}

#[test]
fn zero_weights_fall_back_to_uniform() -> Result<()> {
    let f = fixture(2, vec![code("a", "parse csv rows", vec![1.0, 0.0])])?;
    let req = SearchRequest::new("etl", "csv")
        .vector(VectorField::Syntax, vec![1.0, 0.0])
        .weights(Weights::new().vector(VectorField::Syntax, 0.0).lexical(0.0));
    let results = f.engine.search(&req)?;
    assert!((results[0].score - 1.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn code_mode_skips_ontology_documents() -> Result<()> {
    let concept = EmbeddingRecord::new("concept", "etl", DocumentKind::Ontology, "csv file concept").with_vector(VectorField::Domain, vec![1.0, 0.0]);
    let f = fixture(2, vec![concept, code("fn", "parse csv rows", vec![1.0, 0.0])])?;
    let both = f.engine.search(&SearchRequest::new("etl", "csv"))?;
    assert_eq!(ids(&both), vec!["concept", "fn"]);
    let code_only = f.engine.search(&SearchRequest::new("etl", "csv").mode(SearchMode::Code))?;
    assert_eq!(ids(&code_only), vec!["fn"]);
    Ok(())
}

#[test]
fn ties_keep_cache_order_and_top_k_truncates() -> Result<()> {
    let records = (0..5).map(|i| code(&format!("r{i}"), "same text", vec![1.0, 0.0])).collect();
    let f = fixture(2, records)?;
    let results = f.engine.search(&SearchRequest::new("etl", "text").top_k(3))?;
    assert_eq!(ids(&results), vec!["r0", "r1", "r2"]);
    Ok(())
}

const VOCAB: &[&str] = &["parse", "csv", "rows", "jwt", "token", "customer", "ledger", "export"];

fn corpus() -> Vec<EmbeddingRecord> {
    (0..12)
        .map(|i| {
            let text = format!("{} {} {}", VOCAB[i % VOCAB.len()], VOCAB[(i * 3 + 1) % VOCAB.len()], VOCAB[(i * 5 + 2) % VOCAB.len()]);
            let angle = i as f32 * 0.5;
            let r = code(&format!("r{i}"), &text, vec![angle.cos(), angle.sin(), 0.0]);
            if i % 3 == 0 { r.with_vector(VectorField::Hybrid, vec![0.0, angle.cos(), angle.sin()]) } else { r }
        })
        .collect()
}

proptest! {
    #[test]
    fn rankings_are_ordered_and_repeatable(
        words in proptest::collection::vec(proptest::sample::select(VOCAB), 0..4),
        query in proptest::option::of(proptest::collection::vec(-1.0f32..1.0, 3)),
        syntax_w in 0.0f32..2.0,
        lexical_w in 0.0f32..2.0,
        top_k in 1usize..15,
    ) {
        let f = fixture(3, corpus()).unwrap();
        let mut req = SearchRequest::new("etl", words.join(" "))
            .weights(Weights::new().vector(VectorField::Syntax, syntax_w).lexical(lexical_w))
            .top_k(top_k);
        if let Some(v) = query { req = req.vector(VectorField::Syntax, v); }

        let first = f.engine.search(&req).unwrap();
        let second = f.engine.search(&req).unwrap();
        prop_assert!(first.len() <= top_k);
        prop_assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
        prop_assert_eq!(first, second);
    }
}
