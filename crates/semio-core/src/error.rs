use std::time::Duration;
use thiserror::Error;

use crate::types::{DocumentKind, VectorField};

/// Failures reported by a `VectorStore` backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt stored document {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("application discovery failed: {source}")]
    Discovery {
        #[source]
        source: StoreError,
    },

    #[error("unknown application '{id}'")]
    UnknownApplication { id: String },

    #[error("query vector for '{field}' has {actual} dimensions, cached vectors have {expected}")]
    DimensionMismatch { field: VectorField, expected: usize, actual: usize },

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("no available model after trying [{}]", .attempts.join("; "))]
    NoAvailableModel { attempts: Vec<String> },

    #[error("secret '{name}' not found")]
    SecretNotFound { name: String },

    #[error("reload of {application_id}/{kind} failed, previous entry retained: {source}")]
    Reload {
        application_id: String,
        kind: DocumentKind,
        #[source]
        source: StoreError,
    },

    #[error("unknown model '{name}'")]
    UnknownModel { name: String },

    #[error("could not construct client for '{model}': {reason}")]
    ModelConstruction { model: String, reason: String },

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidArgument { name: name.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
