//! Embedding providers

use hivemind_core::{stable_hash, CapabilityError, EmbeddingVector, HiveError, HiveResult};

/// Trait for embedding providers.
/// Implementations must be thread-safe (Send + Sync).
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> HiveResult<EmbeddingVector>;

    /// Generate embeddings for multiple texts, in input order.
    fn embed_batch(&self, texts: &[&str]) -> HiveResult<Vec<EmbeddingVector>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier of the model behind this provider.
    fn model_id(&self) -> &str;
}

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Each lowercase alphanumeric token is hashed with SHA-256; the hash picks a
/// bucket and a sign. The result is L2-normalized, so texts sharing tokens have
/// positive cosine similarity and the same text always embeds identically.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    /// Number of buckets
    dimensions: usize,
    /// Reported model identifier
    model_id: String,
}

impl HashingEmbedder {
    pub const MODEL_ID: &'static str = "hashing-tokens-v1";

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_id: Self::MODEL_ID.to_string(),
        }
    }

    /// Split text into lowercase alphanumeric tokens.
    pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(|token| token.to_lowercase())
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> HiveResult<EmbeddingVector> {
        if self.dimensions == 0 {
            return Err(HiveError::Capability(CapabilityError::InvalidRequest {
                capability: "embedding".to_string(),
                reason: "embedder configured with zero dimensions".to_string(),
            }));
        }

        let mut data = vec![0.0f32; self.dimensions];
        for token in Self::tokenize(text) {
            let hash = stable_hash(&token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            data[bucket] += sign;
        }

        let mut vector = EmbeddingVector::new(data, self.model_id.clone());
        vector.normalize();
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
