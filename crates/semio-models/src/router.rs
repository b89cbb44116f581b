//! Maps model names to live clients with ordered fallback.
//!
//! Each candidate is tried in turn. A missing credential or a failed
//! construction is recorded and the next candidate is tried; only when every
//! candidate fails does selection return `Error::NoAvailableModel`.
//! Constructed clients are cached per model name until [`ModelRouter::reset`].
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use semio_core::{ApplicationProfile, Error, Result, SecretProvider};

use crate::catalog::{ModelCatalog, TaskConstraints};
use crate::client::{ClientFactory, LanguageModel};

pub struct ModelRouter {
    catalog: ModelCatalog,
    secrets: Arc<dyn SecretProvider>,
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<String, Arc<dyn LanguageModel>>>,
    attempts: Mutex<Vec<String>>,
}

impl ModelRouter {
    pub fn new(catalog: ModelCatalog, secrets: Arc<dyn SecretProvider>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { catalog, secrets, factory, clients: Mutex::new(HashMap::new()), attempts: Mutex::new(Vec::new()) }
    }

    pub fn catalog(&self) -> &ModelCatalog { &self.catalog }

    pub fn resolve(&self, model_name: &str) -> Result<Arc<dyn LanguageModel>> {
        if let Some(client) = self.clients.lock().get(model_name) { return Ok(client.clone()); }

        let spec = self.catalog.get(model_name)?;
        let credential = self.secrets.get_secret(spec.provider.secret_name())?;
        let client = self.factory.build(spec, &credential)?;
        info!(model = model_name, provider = %spec.provider, "model client constructed");
        Ok(self.clients.lock().entry(model_name.to_string()).or_insert(client).clone())
    }

    /// First candidate in `preferred_order` that resolves.
    pub fn select_with_fallback<S: AsRef<str>>(&self, preferred_order: &[S]) -> Result<(String, Arc<dyn LanguageModel>)> {
        if preferred_order.is_empty() {
            return Err(Error::invalid_argument("preferred_order", "at least one model name is required"));
        }
        let mut attempts = Vec::new();
        for name in preferred_order.iter().map(AsRef::as_ref) {
            match self.resolve(name) {
                Ok(client) => {
                    if !attempts.is_empty() { debug!(model = name, skipped = attempts.len(), "fell back"); }
                    *self.attempts.lock() = attempts;
                    return Ok((name.to_string(), client));
                }
                Err(e) => {
                    warn!(model = name, error = %e, "model unavailable, trying next candidate");
                    attempts.push(format!("{name}: {e}"));
                }
            }
        }
        *self.attempts.lock() = attempts.clone();
        Err(Error::NoAvailableModel { attempts })
    }

    /// Select `primary` or one of its catalog fallbacks.
    pub fn select(&self, primary: &str) -> Result<(String, Arc<dyn LanguageModel>)> {
        let chain = self.catalog.fallback_chain(primary);
        self.select_with_fallback(chain.as_slice())
    }

    pub fn select_for_task(&self, task: &str) -> Result<(String, Arc<dyn LanguageModel>)> {
        self.select(self.catalog.recommend_for_task(task))
    }

    /// Like `select_for_task`, but the starting model must meet `constraints`.
    /// Its fallbacks are tried as usual.
    pub fn select_for_task_with(&self, task: &str, constraints: &TaskConstraints) -> Result<(String, Arc<dyn LanguageModel>)> {
        let primary = self.catalog.recommend_with(task, constraints)?;
        self.select(&primary)
    }

    /// Try the application's preferred models, each with its fallbacks.
    pub fn select_for_application(&self, profile: &ApplicationProfile) -> Result<(String, Arc<dyn LanguageModel>)> {
        let chain = self.catalog.preference_chain(&profile.preferred_models);
        self.select_with_fallback(chain.as_slice())
    }

    /// Failures skipped by the most recent selection, in attempt order.
    pub fn attempts(&self) -> Vec<String> { self.attempts.lock().clone() }

    pub fn cached_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn reset(&self) {
        self.clients.lock().clear();
        self.attempts.lock().clear();
        info!("model client cache reset");
    }
}
