//! semio-models
//!
//! Model catalog and the router handing live clients to downstream consumers.
pub mod catalog;
pub mod client;
pub mod router;

pub use catalog::{ModelCatalog, ModelSpec, Provider, Speed, TaskConstraints, DEFAULT_MODEL};
pub use client::{ClientFactory, EndpointClientFactory, LanguageModel, ProviderClient};
pub use router::ModelRouter;
