//! Combining embedding variants into one vector, and measuring how two
//! variants agree over an application's working set.
//!
//! Every fused vector is L2-normalized. A zero vector stays zero.
use std::collections::BTreeMap;

use semio_core::{EmbeddingRecord, Error, Result, VectorField};

use crate::engine::cosine;

/// How `fuse` combines the supplied variants.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionStrategy {
    /// Weighted sum. Weights are normalized over the supplied fields; an
    /// empty map weighs every supplied field equally.
    Weighted(BTreeMap<VectorField, f32>),
    /// Weighted sum where each variant's weight is the softmax of its cosine
    /// similarity to the given vector.
    Attention(Vec<f32>),
    /// Variants laid end to end in field order.
    Concatenate,
}

pub fn fuse(vectors: &BTreeMap<VectorField, Vec<f32>>, strategy: &FusionStrategy) -> Result<Vec<f32>> {
    if vectors.is_empty() { return Err(Error::invalid_argument("vectors", "nothing to fuse")); }
    let fused = match strategy {
        FusionStrategy::Weighted(weights) => weighted(vectors, weights)?,
        FusionStrategy::Attention(query) => attention(vectors, query)?,
        FusionStrategy::Concatenate => vectors.values().flatten().copied().collect(),
    };
    Ok(l2_normalized(fused))
}

fn common_len(vectors: &BTreeMap<VectorField, Vec<f32>>) -> Result<usize> {
    let mut fields = vectors.iter();
    let Some((_, first)) = fields.next() else { return Ok(0) };
    for (field, v) in fields {
        if v.len() != first.len() {
            return Err(Error::DimensionMismatch { field: *field, expected: first.len(), actual: v.len() });
        }
    }
    Ok(first.len())
}

fn weighted(vectors: &BTreeMap<VectorField, Vec<f32>>, weights: &BTreeMap<VectorField, f32>) -> Result<Vec<f32>> {
    let len = common_len(vectors)?;
    if let Some((field, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(Error::invalid_argument("weights", format!("'{field}' has invalid weight {w}")));
    }
    let weight_of = |field: &VectorField| if weights.is_empty() { 1.0 } else { weights.get(field).copied().unwrap_or(0.0) };
    let total: f32 = vectors.keys().map(weight_of).sum();
    if total <= 0.0 { return Err(Error::invalid_argument("weights", "supplied variants carry no weight")); }

    let mut fused = vec![0.0f32; len];
    for (field, v) in vectors {
        let w = weight_of(field) / total;
        if w == 0.0 { continue; }
        for (acc, x) in fused.iter_mut().zip(v) { *acc += w * x; }
    }
    Ok(fused)
}

fn attention(vectors: &BTreeMap<VectorField, Vec<f32>>, query: &[f32]) -> Result<Vec<f32>> {
    let len = common_len(vectors)?;
    let mut scores = Vec::with_capacity(vectors.len());
    for (field, v) in vectors {
        let sim = cosine(query, v).ok_or(Error::DimensionMismatch { field: *field, expected: v.len(), actual: query.len() })?;
        scores.push(sim);
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exp.iter().sum();

    let mut fused = vec![0.0f32; len];
    for (v, e) in vectors.values().zip(&exp) {
        let w = e / sum;
        for (acc, x) in fused.iter_mut().zip(v) { *acc += w * x; }
    }
    Ok(fused)
}

fn l2_normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v { *x = (*x as f64 / norm) as f32; }
    }
    v
}

/// Mean pairwise cosine between variant `a` and variant `b`, over the first
/// `sample_size` records carrying each. Zero when either variant is absent.
pub fn cross_similarity(records: &[EmbeddingRecord], a: VectorField, b: VectorField, sample_size: usize) -> Result<f32> {
    if sample_size == 0 { return Err(Error::invalid_argument("sample_size", "must be positive")); }
    let left: Vec<&[f32]> = records.iter().filter_map(|r| r.vectors.get(a)).take(sample_size).collect();
    let right: Vec<&[f32]> = records.iter().filter_map(|r| r.vectors.get(b)).take(sample_size).collect();
    if left.is_empty() || right.is_empty() { return Ok(0.0); }

    let mut sum = 0.0f64;
    for x in &left {
        for y in &right {
            let sim = cosine(x, y).ok_or(Error::DimensionMismatch { field: b, expected: x.len(), actual: y.len() })?;
            sum += sim as f64;
        }
    }
    Ok((sum / (left.len() * right.len()) as f64) as f32)
}
