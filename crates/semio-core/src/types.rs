//! Domain types shared by the registry, cache, search engine and model router.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, StoreError, StoreResult};
use crate::traits::StoreFilter;

pub type Meta = BTreeMap<String, String>;

/// Which collection a document was embedded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Ontology,
    Code,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Ontology, DocumentKind::Code];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Ontology => "ontology",
            DocumentKind::Code => "code",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ontology" => Ok(DocumentKind::Ontology),
            "code" => Ok(DocumentKind::Code),
            other => Err(Error::invalid_argument("kind", format!("unknown document kind '{other}'"))),
        }
    }
}

/// One named embedding variant.
///
/// Legacy model names (`codebert`, `graphcodebert`, `ontology`) are accepted
/// when parsing and map onto the variant they were used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorField {
    #[serde(alias = "codebert")]
    Syntax,
    #[serde(alias = "graphcodebert")]
    Dataflow,
    #[serde(alias = "ontology")]
    Domain,
    Hybrid,
}

impl VectorField {
    pub const ALL: [VectorField; 4] = [VectorField::Syntax, VectorField::Dataflow, VectorField::Domain, VectorField::Hybrid];

    pub fn name(&self) -> &'static str {
        match self {
            VectorField::Syntax => "syntax",
            VectorField::Dataflow => "dataflow",
            VectorField::Domain => "domain",
            VectorField::Hybrid => "hybrid",
        }
    }

    /// Column/field name used by persisted stores.
    pub fn column(&self) -> &'static str {
        match self {
            VectorField::Syntax => "syntax_vector",
            VectorField::Dataflow => "dataflow_vector",
            VectorField::Domain => "domain_vector",
            VectorField::Hybrid => "hybrid_vector",
        }
    }
}

impl fmt::Display for VectorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for VectorField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "syntax" | "syntax_vector" | "codebert" => Ok(VectorField::Syntax),
            "dataflow" | "dataflow_vector" | "graphcodebert" => Ok(VectorField::Dataflow),
            "domain" | "domain_vector" | "ontology" => Ok(VectorField::Domain),
            "hybrid" | "hybrid_vector" => Ok(VectorField::Hybrid),
            other => Err(Error::invalid_argument("vector_field", format!("unknown embedding variant '{other}'"))),
        }
    }
}

/// A scoring signal: one embedding variant or the lexical term overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Signal {
    Vector(VectorField),
    Lexical,
}

impl Signal {
    pub const LEXICAL_NAME: &'static str = "lexical";

    pub fn all() -> impl Iterator<Item = Signal> {
        VectorField::ALL.into_iter().map(Signal::Vector).chain(std::iter::once(Signal::Lexical))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Vector(field) => field.name(),
            Signal::Lexical => Self::LEXICAL_NAME,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == Self::LEXICAL_NAME { return Ok(Signal::Lexical); }
        s.parse::<VectorField>()
            .map(Signal::Vector)
            .map_err(|_| Error::invalid_argument("weights", format!("unknown signal '{s}'")))
    }
}

impl TryFrom<String> for Signal {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> { value.parse() }
}

impl From<Signal> for String {
    fn from(signal: Signal) -> Self { signal.name().to_string() }
}

/// Declared dimensionality of every vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSchema {
    pub syntax: usize,
    pub dataflow: usize,
    pub domain: usize,
    pub hybrid: usize,
}

impl EmbeddingSchema {
    pub const DEFAULT_DIM: usize = 768;

    pub fn uniform(dim: usize) -> Self { Self { syntax: dim, dataflow: dim, domain: dim, hybrid: dim } }

    pub fn dim(&self, field: VectorField) -> usize {
        match field {
            VectorField::Syntax => self.syntax,
            VectorField::Dataflow => self.dataflow,
            VectorField::Domain => self.domain,
            VectorField::Hybrid => self.hybrid,
        }
    }
}

impl Default for EmbeddingSchema {
    fn default() -> Self { Self::uniform(Self::DEFAULT_DIM) }
}

/// The optional named vector fields of one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataflow: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid: Option<Vec<f32>>,
}

impl Vectors {
    pub fn get(&self, field: VectorField) -> Option<&[f32]> {
        let slot = match field {
            VectorField::Syntax => &self.syntax,
            VectorField::Dataflow => &self.dataflow,
            VectorField::Domain => &self.domain,
            VectorField::Hybrid => &self.hybrid,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, field: VectorField, vector: Vec<f32>) {
        let slot = match field {
            VectorField::Syntax => &mut self.syntax,
            VectorField::Dataflow => &mut self.dataflow,
            VectorField::Domain => &mut self.domain,
            VectorField::Hybrid => &mut self.hybrid,
        };
        *slot = Some(vector);
    }

    /// Fields that carry a vector, in declaration order.
    pub fn present(&self) -> impl Iterator<Item = VectorField> + '_ {
        VectorField::ALL.into_iter().filter(move |f| self.get(*f).is_some())
    }

    pub fn is_empty(&self) -> bool { self.present().next().is_none() }
}

/// One vectorized document unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub application_id: String,
    pub kind: DocumentKind,
    /// Secondary marker shared by documents of the same dataset.
    #[serde(default)]
    pub source: Option<String>,
    pub chunk_text: String,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub vectors: Vectors,
}

impl EmbeddingRecord {
    pub fn new(id: impl Into<String>, application_id: impl Into<String>, kind: DocumentKind, chunk_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            application_id: application_id.into(),
            kind,
            source: None,
            chunk_text: chunk_text.into(),
            metadata: Meta::new(),
            vectors: Vectors::default(),
        }
    }

    pub fn with_vector(mut self, field: VectorField, vector: Vec<f32>) -> Self {
        self.vectors.set(field, vector);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Ingestion-time checks: retrievable text, at least one vector, declared
    /// dimensionality and finite components.
    pub fn validate(&self, schema: &EmbeddingSchema) -> Result<()> {
        if self.chunk_text.trim().is_empty() {
            return Err(Error::InvalidRecord { id: self.id.clone(), reason: "chunk_text is empty".into() });
        }
        if self.vectors.is_empty() {
            return Err(Error::InvalidRecord { id: self.id.clone(), reason: "no vector field populated".into() });
        }
        for field in self.vectors.present() {
            let Some(v) = self.vectors.get(field) else { continue };
            let expected = schema.dim(field);
            if v.len() != expected {
                return Err(Error::InvalidRecord {
                    id: self.id.clone(),
                    reason: format!("{} has {} dimensions, expected {}", field.column(), v.len(), expected),
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidRecord { id: self.id.clone(), reason: format!("{} contains non-finite values", field.column()) });
            }
        }
        Ok(())
    }

    /// `validate` for a document read back from a store: any violation means
    /// the stored copy is corrupt.
    pub fn check_stored(&self, schema: &EmbeddingSchema) -> StoreResult<()> {
        self.validate(schema).map_err(|e| match e {
            Error::InvalidRecord { id, reason } => StoreError::Corrupt { id, reason },
            other => StoreError::Corrupt { id: self.id.clone(), reason: other.to_string() },
        })
    }
}

/// The identifying columns of one stored document, without text or vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub application_id: String,
    #[serde(default)]
    pub source: Option<String>,
    pub kind: DocumentKind,
}

impl DocumentIdentity {
    pub fn new(application_id: impl Into<String>, source: Option<&str>, kind: DocumentKind) -> Self {
        Self { application_id: application_id.into(), source: source.map(str::to_string), kind }
    }
}

impl From<&EmbeddingRecord> for DocumentIdentity {
    fn from(record: &EmbeddingRecord) -> Self {
        Self { application_id: record.application_id.clone(), source: record.source.clone(), kind: record.kind }
    }
}

/// Canonical identity for one indexed application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub canonical_id: String,
    /// Raw identifiers (other than the canonical one) that resolve here.
    pub aliases: BTreeSet<String>,
    /// Marker (`source`) values owned by this application.
    pub markers: BTreeSet<String>,
    /// Identifiers that carry one of `markers` but were pinned to another
    /// application by the alias table.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded: BTreeSet<String>,
    pub document_counts: BTreeMap<DocumentKind, usize>,
}

impl ApplicationRecord {
    pub fn new(canonical_id: impl Into<String>) -> Self {
        Self { canonical_id: canonical_id.into(), ..Self::default() }
    }

    pub fn answers_to(&self, raw_id: &str) -> bool {
        self.canonical_id == raw_id || self.aliases.contains(raw_id)
    }

    pub fn count(&self, kind: DocumentKind) -> usize { self.document_counts.get(&kind).copied().unwrap_or(0) }

    pub fn total_documents(&self) -> usize { self.document_counts.values().sum() }

    /// Store filter selecting this application's documents of one kind.
    pub fn filter(&self, kind: DocumentKind) -> StoreFilter {
        let mut application_ids = self.aliases.clone();
        application_ids.insert(self.canonical_id.clone());
        StoreFilter {
            application_ids,
            sources: self.markers.clone(),
            excluded_ids: self.excluded.clone(),
            kind: Some(kind),
            limit: None,
        }
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub kind: DocumentKind,
    pub chunk_text: String,
    pub metadata: Meta,
    /// Combined weighted score; higher is better.
    pub score: f32,
    /// Raw per-signal sub-scores before weighting.
    pub score_breakdown: BTreeMap<Signal, f32>,
}
