//! Vector math for the index: Euclidean distance and L2 normalization.
//!
//! The index ranks by plain Euclidean distance. Feeding it unit-length vectors
//! makes that ranking equivalent to cosine similarity, since
//! `‖u − v‖² = 2 − 2·cos(u, v)` for unit `u` and `v`.

use crate::error::{HnswError, Result};

/// Euclidean (L2) distance between two vectors of equal length.
///
/// Accumulates `Σ(uᵢ − vᵢ)²` in `f32` and returns its square root. Callers
/// validate lengths at the index boundary.
#[inline]
pub fn distance(u: &[f32], v: &[f32]) -> f32 {
    debug_assert_eq!(u.len(), v.len(), "distance over vectors of unequal length");
    u.iter()
        .zip(v)
        .map(|(&a, &b)| {
            let d = a - b;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// L2 norm of a vector.
#[inline]
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|&x| x * x).sum::<f32>().sqrt()
}

/// Returns `v` scaled to unit length.
///
/// Fails with [`HnswError::ZeroVector`] when the norm is zero or not finite,
/// since scaling would produce NaN or infinite components.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let norm = magnitude(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(HnswError::ZeroVector);
    }
    let factor = 1.0 / norm;
    Ok(v.iter().map(|&x| x * factor).collect())
}
