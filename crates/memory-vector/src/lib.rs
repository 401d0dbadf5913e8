//! # memory-vector
//!
//! Vector math for semantic memory search.
//!
//! Embeddings are normalized to unit length when created, so the dot product
//! of two stored embeddings is their cosine similarity. Vectors are encoded as
//! little-endian f32 values for storage.

pub mod embedding;
pub mod error;
pub mod math;

pub use embedding::Embedding;
pub use error::VectorError;
pub use math::{cosine_similarity, dot_product, from_bytes, magnitude, normalize, to_bytes};
