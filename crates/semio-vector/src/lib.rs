//! semio-vector
//!
//! Vector storage and the in-memory embedding working set:
//! - `MemoryVectorStore` and `LanceVectorStore` implement `VectorStore`
//! - `EmbeddingCache` materializes bounded per-application snapshots
pub mod cache;
pub mod lance;
pub mod memory;
pub mod schema;

pub use cache::{CacheEntry, CacheKey, CachePolicy, CacheStats, EmbeddingCache};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
