//! semio-hybrid
//!
//! Fuses cosine similarity across embedding variants with lexical term
//! overlap into one ranked result list per application.
pub mod engine;
pub mod fusion;
pub mod mode;
pub mod weights;

pub use engine::{cosine, HybridSearchEngine, SearchRequest};
pub use fusion::{cross_similarity, fuse, FusionStrategy};
pub use mode::SearchMode;
pub use weights::Weights;
