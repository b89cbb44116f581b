//! Layered configuration loader.
//!
//! Uses Figment to merge `semio.toml` + `semio.<env>.toml` + `SEMIO_*` env vars
//! (`__` separates nested keys, e.g. `SEMIO_CACHE__LIMIT=200`). Typed settings
//! are extracted with [`Config::settings`]; every section has defaults so an
//! empty configuration is valid.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{EmbeddingSchema, VectorField};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("semio.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("semio.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("semio.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("semio.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("SEMIO_").split("__"));

        let config = Self { figment };
        config.settings().map_err(|e| anyhow::anyhow!("config for env '{}' rejected: {}", env_name, e))?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn from_toml_str(toml: &str) -> Self { Self { figment: Figment::new().merge(Toml::string(toml)) } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub schema: EmbeddingSchema,
    pub cache: CacheSettings,
    pub search: SearchSettings,
    pub registry: RegistrySettings,
    pub models: ModelSettings,
    /// Per-application profiles keyed by any identifier of the application.
    pub applications: BTreeMap<String, ApplicationProfile>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.store.timeout_ms == 0 { return Err(Error::InvalidConfig("store.timeout_ms must be positive".into())); }
        if self.cache.limit == 0 { return Err(Error::InvalidConfig("cache.limit must be positive".into())); }
        if self.search.default_top_k == 0 { return Err(Error::InvalidConfig("search.default_top_k must be positive".into())); }
        for field in VectorField::ALL {
            if self.schema.dim(field) == 0 {
                return Err(Error::InvalidConfig(format!("schema.{} must be positive", field.name())));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
    pub table: String,
    pub timeout_ms: u64,
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

    /// Location handed to the store backend.
    ///
    /// Remote URIs (`scheme://...`) are returned untouched. Local paths get
    /// `~` and `$VAR` expanded and, when still relative, are joined onto `base`.
    pub fn location(&self, base: &Path) -> Result<String> {
        if self.uri.contains("://") { return Ok(self.uri.clone()); }
        let expanded = shellexpand::full(&self.uri)
            .map_err(|e| Error::InvalidConfig(format!("store.uri '{}': {}", self.uri, e)))?;
        let path = PathBuf::from(expanded.as_ref());
        let path = if path.is_absolute() { path } else { base.join(path) };
        Ok(path.to_string_lossy().into_owned())
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { uri: "~/.semio/lancedb".to_string(), table: "embeddings".to_string(), timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum records materialized per (application, kind).
    pub limit: usize,
    pub ttl_secs: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

impl Default for CacheSettings {
    fn default() -> Self { Self { limit: 500, ttl_secs: 3_600 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
    /// Drop common English stop words before computing term overlap.
    pub stop_words: bool,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { default_top_k: 10, stop_words: false } }
}

/// How documents of one dataset that carry different identifiers get merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRule {
    Off,
    /// Identifiers of documents that share a `source` marker are one application.
    #[default]
    SharedMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Explicit alias table: raw identifier -> canonical identifier.
    pub aliases: BTreeMap<String, String>,
    pub marker_rule: MarkerRule,
    /// Identifiers matching this pattern are generated, not human-readable.
    pub generated_id_pattern: String,
}

impl RegistrySettings {
    pub const DEFAULT_GENERATED_ID_PATTERN: &'static str =
        r"^(?:[0-9a-fA-F]{24}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$";
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            marker_rule: MarkerRule::default(),
            generated_id_pattern: Self::DEFAULT_GENERATED_ID_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Provider name -> API base URL. Providers without an endpoint cannot be constructed.
    pub endpoints: BTreeMap<String, String>,
    /// Model name -> ordered fallback candidates, replacing the built-in chain.
    pub fallbacks: BTreeMap<String, Vec<String>>,
}

/// Descriptive settings for one indexed application.
///
/// `embedding_types` limits which vector variants search may score for the
/// application; empty enables every variant. `preferred_models` is tried
/// before the default fallback chain when picking a model for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationProfile {
    pub description: String,
    pub domain: String,
    pub primary_language: String,
    pub embedding_types: Vec<VectorField>,
    pub preferred_models: Vec<String>,
    pub ontology_path: Option<String>,
}

impl ApplicationProfile {
    pub fn enables(&self, field: VectorField) -> bool {
        self.embedding_types.is_empty() || self.embedding_types.contains(&field)
    }
}
