//! Embedding vector operations

use crate::{HiveError, HiveResult, VectorError};
use serde::{Deserialize, Serialize};

/// Embedding vector with dynamic dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    /// The embedding data as a vector of f32 values.
    pub data: Vec<f32>,
    /// Identifier of the model that produced this embedding.
    pub model_id: String,
}

impl EmbeddingVector {
    /// Create a new embedding vector.
    pub fn new(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        Self {
            data,
            model_id: model_id.into(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.data.len()
    }

    /// Compute cosine similarity between two embedding vectors.
    ///
    /// A zero-norm operand yields 0.0 rather than NaN.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> HiveResult<f32> {
        if self.dimensions() != other.dimensions() {
            return Err(HiveError::Vector(VectorError::DimensionMismatch {
                expected: self.dimensions(),
                got: other.dimensions(),
            }));
        }

        let mut dot_product = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.data.iter().zip(other.data.iter()) {
            dot_product += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let norm_a = norm_a.sqrt();
        let norm_b = norm_b.sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }

        Ok(dot_product / (norm_a * norm_b))
    }

    /// Scale to unit length in place. Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm = self.data.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut self.data {
                *v /= norm;
            }
        }
    }

    /// Check if this vector is usable for similarity search.
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.data.iter().all(|v| v.is_finite())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(data: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(data.to_vec(), "test")
    }

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let v = vec_of(&[1.0, 2.0, 3.0]);
        let sim = v.cosine_similarity(&v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_vectors() {
        let a = vec_of(&[1.0, 0.0]);
        let b = vec_of(&[0.0, 1.0]);
        assert!(a.cosine_similarity(&b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_returns_zero() {
        let a = vec_of(&[0.0, 0.0]);
        let b = vec_of(&[1.0, 1.0]);
        assert_eq!(a.cosine_similarity(&b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let a = vec_of(&[1.0, 0.0, 0.0]);
        let b = vec_of(&[1.0, 0.0]);
        assert!(matches!(
            a.cosine_similarity(&b),
            Err(HiveError::Vector(VectorError::DimensionMismatch {
                expected: 3,
                got: 2
            }))
        ));
    }

    #[test]
    fn test_normalize_yields_unit_length() {
        let mut v = vec_of(&[3.0, 4.0]);
        v.normalize();
        assert!((v.data[0] - 0.6).abs() < 1e-6);
        assert!((v.data[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_empty_vector_is_invalid() {
        assert!(!vec_of(&[]).is_valid());
        assert!(!vec_of(&[f32::NAN]).is_valid());
        assert!(vec_of(&[0.5]).is_valid());
    }
}
