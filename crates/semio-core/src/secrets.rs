//! Credential providers.
//!
//! The core only ever asks for a secret by name; where it comes from is the
//! provider's business. Values are never logged.
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::traits::SecretProvider;

/// Reads secrets from process environment variables, memoising hits.
#[derive(Debug, Default)]
pub struct EnvSecretProvider {
    prefix: String,
    cache: Mutex<HashMap<String, String>>,
}

impl EnvSecretProvider {
    pub fn new() -> Self { Self::default() }

    /// Look up `<prefix><name>` instead of `<name>`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), cache: Mutex::new(HashMap::new()) }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn get_secret(&self, name: &str) -> Result<String> {
        if let Some(v) = self.cache.lock().get(name) { return Ok(v.clone()); }
        let var = format!("{}{}", self.prefix, name);
        match std::env::var(&var) {
            Ok(v) if !v.trim().is_empty() => {
                self.cache.lock().insert(name.to_string(), v.clone());
                tracing::debug!(secret = name, "secret resolved from environment");
                Ok(v)
            }
            _ => Err(Error::SecretNotFound { name: name.to_string() }),
        }
    }
}

/// Fixed in-memory secrets, for embedding callers and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn get_secret(&self, name: &str) -> Result<String> {
        self.values
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| Error::SecretNotFound { name: name.to_string() })
    }
}
