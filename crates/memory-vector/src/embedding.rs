//! Normalized embedding vectors.

use serde::{Deserialize, Serialize};

use crate::error::VectorError;
use crate::math;

/// Vector embedding, always unit length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Normalize and wrap a vector.
    pub fn new(values: Vec<f32>) -> Result<Self, VectorError> {
        Ok(Self {
            values: math::normalize(&values)?,
        })
    }

    /// Decode from little-endian bytes, renormalizing the result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        Self::new(math::from_bytes(bytes)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        math::to_bytes(&self.values)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1].
    pub fn similarity(&self, other: &Embedding) -> Result<f32, VectorError> {
        math::dot_product(&self.values, &other.values)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = VectorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}
