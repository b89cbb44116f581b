use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use semio_core::{Error, Result, Signal, VectorField};

/// Per-signal weights as supplied by a caller. Missing signals weigh zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weights(BTreeMap<Signal, f32>);

impl Weights {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, signal: Signal, weight: f32) -> Self {
        self.0.insert(signal, weight);
        self
    }

    pub fn vector(self, field: VectorField, weight: f32) -> Self { self.with(Signal::Vector(field), weight) }

    pub fn lexical(self, weight: f32) -> Self { self.with(Signal::Lexical, weight) }

    /// Build from `(signal name, weight)` pairs, e.g. parsed user input.
    pub fn from_names<'a>(pairs: impl IntoIterator<Item = (&'a str, f32)>) -> Result<Self> {
        let mut weights = Self::new();
        for (name, weight) in pairs { weights.0.insert(name.parse()?, weight); }
        Ok(weights)
    }

    pub fn get(&self, signal: Signal) -> Option<f32> { self.0.get(&signal).copied() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, f32)> + '_ { self.0.iter().map(|(s, w)| (*s, *w)) }

    pub fn validate(&self) -> Result<()> {
        for (signal, w) in self.iter() {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::invalid_argument("weights", format!("weight for '{signal}' must be a non-negative number, got {w}")));
            }
        }
        Ok(())
    }

    /// Normalized weights over `active` signals.
    ///
    /// Supplied weights are scaled to sum to one. When they sum to zero (or
    /// none were supplied for the active signals) every active signal gets
    /// the same share.
    pub fn effective(&self, active: &[Signal]) -> BTreeMap<Signal, f32> {
        let sum: f32 = active.iter().map(|s| self.get(*s).unwrap_or(0.0)).sum();
        active
            .iter()
            .map(|s| {
                let w = if sum > 0.0 { self.get(*s).unwrap_or(0.0) / sum } else { 1.0 / active.len() as f32 };
                (*s, w)
            })
            .collect()
    }
}
