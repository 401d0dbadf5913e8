//! Pure vector math: normalization, similarity and binary encoding.
//!
//! Vectors are normalized when written, which makes the dot product of two
//! stored vectors their cosine similarity.

use crate::error::VectorError;

/// Width of one encoded component.
pub const BYTES_PER_COMPONENT: usize = std::mem::size_of::<f32>();

/// Scale a vector to unit L2 norm.
///
/// Components are divided by the largest magnitude before squaring, so very
/// small and very large vectors normalize without underflow or overflow.
pub fn normalize(vector: &[f32]) -> Result<Vec<f32>, VectorError> {
    if vector.is_empty() {
        return Err(VectorError::EmptyVector);
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite);
    }
    let max = max_abs(vector);
    if max == 0.0 {
        return Err(VectorError::ZeroVector);
    }

    let scaled: Vec<f64> = vector.iter().map(|x| f64::from(*x) / max).collect();
    let norm = scaled.iter().map(|x| x * x).sum::<f64>().sqrt();
    Ok(scaled.iter().map(|x| (x / norm) as f32).collect())
}

pub fn magnitude(vector: &[f32]) -> f32 {
    if vector.iter().any(|x| !x.is_finite()) {
        return vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    }
    let max = max_abs(vector);
    if max == 0.0 {
        return 0.0;
    }
    let sum: f64 = vector
        .iter()
        .map(|x| {
            let scaled = f64::from(*x) / max;
            scaled * scaled
        })
        .sum();
    (max * sum.sqrt()) as f32
}

fn max_abs(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|x| f64::from(x.abs()))
        .fold(0.0, f64::max)
}

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine similarity of two arbitrary vectors.
///
/// Normalizes both sides first; prefer [`dot_product`] on stored vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    dot_product(&normalize(a)?, &normalize(b)?)
}

/// Encode as consecutive little-endian f32 values.
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
    if bytes.len() % BYTES_PER_COMPONENT != 0 {
        return Err(VectorError::InvalidByteLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(BYTES_PER_COMPONENT)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
