use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use semio_core::config::ModelSettings;
use semio_core::{Error, Result};

use crate::catalog::{ModelSpec, Provider};

/// A constructed client for one model.
pub trait LanguageModel: Send + Sync + fmt::Debug {
    fn model(&self) -> &str;
    fn provider(&self) -> Provider;
}

/// Builds clients. Failing here marks the model unavailable for this attempt.
pub trait ClientFactory: Send + Sync {
    fn build(&self, spec: &ModelSpec, credential: &str) -> Result<Arc<dyn LanguageModel>>;
}

/// Handle to a provider HTTP endpoint. Requests are issued by the consumer.
pub struct ProviderClient {
    model: String,
    provider: Provider,
    endpoint: String,
    credential: String,
}

impl ProviderClient {
    pub fn endpoint(&self) -> &str { &self.endpoint }

    pub fn credential(&self) -> &str { &self.credential }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl LanguageModel for ProviderClient {
    fn model(&self) -> &str { &self.model }

    fn provider(&self) -> Provider { self.provider }
}

/// Builds `ProviderClient`s for providers that have an endpoint configured.
#[derive(Debug, Clone, Default)]
pub struct EndpointClientFactory {
    endpoints: BTreeMap<Provider, String>,
}

impl EndpointClientFactory {
    pub fn new() -> Self { Self::default() }

    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let mut factory = Self::new();
        for (provider, url) in &settings.endpoints {
            factory = factory.with_endpoint(provider.parse()?, url);
        }
        Ok(factory)
    }

    pub fn with_endpoint(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.endpoints.insert(provider, url.into());
        self
    }
}

impl ClientFactory for EndpointClientFactory {
    fn build(&self, spec: &ModelSpec, credential: &str) -> Result<Arc<dyn LanguageModel>> {
        let fail = |reason: String| Error::ModelConstruction { model: spec.name.clone(), reason };
        let endpoint = self
            .endpoints
            .get(&spec.provider)
            .ok_or_else(|| fail(format!("no endpoint configured for provider '{}'", spec.provider)))?;
        // truncated keys copied out of dashboards end in "..."
        if credential.trim().is_empty() || credential.ends_with("...") {
            return Err(fail(format!("credential for '{}' is incomplete", spec.provider)));
        }
        Ok(Arc::new(ProviderClient {
            model: spec.name.clone(),
            provider: spec.provider,
            endpoint: endpoint.clone(),
            credential: credential.to_string(),
        }))
    }
}
