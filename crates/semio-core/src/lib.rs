//! Shared vocabulary of the retrieval layer: domain types, the error
//! taxonomy, configuration, and the store/secret seams.

pub mod config;
pub mod error;
pub mod logging;
pub mod secrets;
pub mod traits;
pub mod types;

pub use error::{Error, Result, StoreError, StoreResult};
pub use traits::{SecretProvider, StoreFilter, VectorStore};
pub use config::ApplicationProfile;
pub use types::{ApplicationRecord, DocumentIdentity, DocumentKind, EmbeddingRecord, EmbeddingSchema, Meta, QueryResult, Signal, VectorField, Vectors};
