//! Known models, their providers and default fallback chains.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use semio_core::config::ModelSettings;
use semio_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Mistral,
    Meta,
    Google,
    BigCode,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Mistral => "mistral",
            Provider::Meta => "meta",
            Provider::Google => "google",
            Provider::BigCode => "bigcode",
        }
    }

    /// Name of the secret holding this provider's credential.
    pub fn secret_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::Meta => "META_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
            Provider::BigCode => "HUGGINGFACE_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "mistral" => Ok(Provider::Mistral),
            "meta" => Ok(Provider::Meta),
            "google" => Ok(Provider::Google),
            "bigcode" => Ok(Provider::BigCode),
            other => Err(Error::InvalidConfig(format!("unknown model provider '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub provider: Provider,
    pub context_window: u32,
    pub speed: Speed,
    pub capabilities: Vec<String>,
    /// USD per 1000 prompt tokens.
    #[serde(default)]
    pub cost_per_1k_input: f64,
    /// USD per 1000 completion tokens.
    #[serde(default)]
    pub cost_per_1k_output: f64,
    #[serde(default)]
    pub supports_functions: bool,
    #[serde(default)]
    pub supports_vision: bool,
    /// Task names this model is a good default for.
    #[serde(default)]
    pub best_for: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: Provider, context_window: u32, speed: Speed, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider,
            context_window,
            speed,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            supports_functions: false,
            supports_vision: false,
            best_for: Vec::new(),
        }
    }

    pub fn priced(mut self, input: f64, output: f64) -> Self {
        self.cost_per_1k_input = input;
        self.cost_per_1k_output = output;
        self
    }

    pub fn with_functions(mut self) -> Self {
        self.supports_functions = true;
        self
    }

    pub fn with_vision(mut self) -> Self {
        self.supports_vision = true;
        self
    }

    pub fn best_for(mut self, tasks: &[&str]) -> Self {
        self.best_for = tasks.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool { self.capabilities.iter().any(|c| c == capability) }

    /// Price in USD of one call with the given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.cost_per_1k_input + (output_tokens as f64 / 1000.0) * self.cost_per_1k_output
    }
}

/// Requirements a task places on the model chosen for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskConstraints {
    /// Upper bound on `cost_per_1k_input`.
    pub max_cost: Option<f64>,
    pub required_speed: Option<Speed>,
    pub needs_functions: bool,
    pub needs_vision: bool,
}

impl TaskConstraints {
    pub fn allows(&self, spec: &ModelSpec) -> bool {
        self.max_cost.map_or(true, |max| spec.cost_per_1k_input <= max)
            && self.required_speed.map_or(true, |speed| spec.speed == speed)
            && (!self.needs_functions || spec.supports_functions)
            && (!self.needs_vision || spec.supports_vision)
    }
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const TASKS: &[(&str, &str)] = &[
    ("code_generation", "codellama-34b"),
    ("code_review", "gpt-4"),
    ("quick_answer", "gpt-3.5-turbo"),
    ("complex_analysis", "gpt-4"),
    ("long_document", "claude-3-opus"),
    ("multilingual", "mistral-large"),
    ("on_premise", "llama-70b"),
    ("vision", "gpt-4o-mini"),
];

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    specs: BTreeMap<String, ModelSpec>,
    fallbacks: BTreeMap<String, Vec<String>>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        use Provider::*;
        use Speed::*;
        let specs = [
            ModelSpec::new("gpt-4", OpenAi, 8_192, Slow, &["reasoning", "code", "analysis", "creative"])
                .priced(0.03, 0.06)
                .with_functions()
                .best_for(&["complex_analysis", "architecture_design", "code_review"]),
            ModelSpec::new("gpt-4-turbo", OpenAi, 128_000, Medium, &["reasoning", "code", "analysis", "long_context"])
                .priced(0.01, 0.03)
                .with_functions()
                .with_vision(),
            ModelSpec::new("gpt-4o-mini", OpenAi, 128_000, Fast, &["reasoning", "code", "analysis"])
                .priced(0.00015, 0.0006)
                .with_functions()
                .with_vision()
                .best_for(&["quick_analysis", "code_generation", "chat"]),
            ModelSpec::new("gpt-3.5-turbo", OpenAi, 16_384, Fast, &["code", "basic_analysis", "chat"])
                .priced(0.0005, 0.0015)
                .with_functions()
                .best_for(&["quick_responses", "simple_queries", "prototyping"]),
            ModelSpec::new("claude-3-opus", Anthropic, 200_000, Medium, &["code", "long_context", "reasoning", "analysis"])
                .priced(0.015, 0.075)
                .with_vision()
                .best_for(&["code_generation", "documentation", "complex_reasoning"]),
            ModelSpec::new("claude-3-sonnet", Anthropic, 200_000, Fast, &["code", "long_context", "analysis"])
                .priced(0.003, 0.015)
                .with_vision(),
            ModelSpec::new("claude-instant", Anthropic, 100_000, Fast, &["chat", "basic_analysis"]).priced(0.0008, 0.0024),
            ModelSpec::new("mistral-large", Mistral, 32_000, Fast, &["multilingual", "code", "reasoning"])
                .priced(0.004, 0.012)
                .with_functions()
                .best_for(&["european_languages", "fast_inference", "code_completion"]),
            ModelSpec::new("mistral-7b", Mistral, 32_000, Fast, &["chat", "open_source"]).priced(0.00025, 0.00025),
            ModelSpec::new("llama-70b", Meta, 4_096, Medium, &["code", "reasoning", "open_source"])
                .priced(0.001, 0.001)
                .best_for(&["on_premise", "privacy_sensitive", "customization"]),
            ModelSpec::new("llama-13b", Meta, 4_096, Fast, &["chat", "open_source"]).priced(0.0003, 0.0003),
            ModelSpec::new("codellama-34b", Meta, 16_384, Fast, &["code", "completion", "debugging"])
                .priced(0.0005, 0.0005)
                .best_for(&["code_generation", "code_completion", "refactoring"]),
            ModelSpec::new("starcoder", BigCode, 8_192, Fast, &["code", "completion"]).priced(0.0002, 0.0002),
            ModelSpec::new("gemini-pro", Google, 32_760, Medium, &["reasoning", "multilingual"]).priced(0.0005, 0.0015),
        ];
        let chain = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut fallbacks = BTreeMap::new();
        fallbacks.insert("gpt-4".to_string(), chain(&["gpt-4o-mini", "gpt-3.5-turbo"]));
        fallbacks.insert("claude-3-opus".to_string(), chain(&["claude-3-sonnet", "gpt-4o-mini"]));
        fallbacks.insert("llama-70b".to_string(), chain(&["llama-13b", "mistral-7b"]));
        fallbacks.insert("codellama-34b".to_string(), chain(&["starcoder", "gpt-3.5-turbo"]));
        Self { specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(), fallbacks }
    }

    /// Built-in catalog with configured fallback chains layered on top.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let mut catalog = Self::builtin();
        for (primary, chain) in &settings.fallbacks {
            for name in std::iter::once(primary).chain(chain) {
                if !catalog.specs.contains_key(name) {
                    return Err(Error::InvalidConfig(format!("models.fallbacks refers to unknown model '{name}'")));
                }
            }
            catalog.fallbacks.insert(primary.clone(), chain.clone());
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, spec: ModelSpec) { self.specs.insert(spec.name.clone(), spec); }

    pub fn get(&self, name: &str) -> Result<&ModelSpec> {
        self.specs.get(name).ok_or_else(|| Error::UnknownModel { name: name.to_string() })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.specs.keys().map(String::as_str) }

    /// Each preferred model followed by its fallbacks, first occurrence kept.
    /// No preference means the default model's chain.
    pub fn preference_chain<S: AsRef<str>>(&self, preferred: &[S]) -> Vec<String> {
        if preferred.is_empty() { return self.fallback_chain(DEFAULT_MODEL); }
        let mut chain: Vec<String> = Vec::new();
        for name in preferred.iter().flat_map(|p| self.fallback_chain(p.as_ref())) {
            if !chain.contains(&name) { chain.push(name); }
        }
        chain
    }

    /// `primary` followed by its fallbacks; unknown primaries fall back to the default model.
    pub fn fallback_chain(&self, primary: &str) -> Vec<String> {
        let mut chain = vec![primary.to_string()];
        match self.fallbacks.get(primary) {
            Some(rest) => chain.extend(rest.iter().filter(|n| n.as_str() != primary).cloned()),
            None if primary != DEFAULT_MODEL => chain.push(DEFAULT_MODEL.to_string()),
            None => {}
        }
        chain
    }

    pub fn recommend_for_task(&self, task: &str) -> &'static str {
        TASKS.iter().find(|(t, _)| *t == task).map(|(_, m)| *m).unwrap_or(DEFAULT_MODEL)
    }

    /// The task's model when it meets `constraints`, otherwise the cheapest
    /// model that does (ties broken by name).
    pub fn recommend_with(&self, task: &str, constraints: &TaskConstraints) -> Result<String> {
        let recommended = self.recommend_for_task(task);
        if self.get(recommended).is_ok_and(|spec| constraints.allows(spec)) {
            return Ok(recommended.to_string());
        }
        self.specs
            .values()
            .filter(|spec| constraints.allows(spec))
            .min_by(|a, b| a.cost_per_1k_input.total_cmp(&b.cost_per_1k_input).then_with(|| a.name.cmp(&b.name)))
            .map(|spec| spec.name.clone())
            .ok_or_else(|| Error::invalid_argument("constraints", format!("no catalog model satisfies {constraints:?}")))
    }
}

impl Default for ModelCatalog {
    fn default() -> Self { Self::builtin() }
}
