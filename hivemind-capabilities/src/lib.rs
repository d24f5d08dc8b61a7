//! HIVEMIND Capabilities - External Capability Interfaces
//!
//! Provider-agnostic traits for the capabilities the collective consumes:
//! decision oracles, chat/workflow backends and embedding providers. Each has
//! a rich variant and a deterministic variant; which one runs is chosen when
//! services are constructed.

mod chat;
mod embedding;
mod oracle;

pub use chat::*;
pub use embedding::*;
pub use oracle::*;

use hivemind_core::{CapabilityError, HiveError, HiveResult};
use std::sync::Arc;

// ============================================================================
// CAPABILITY REGISTRY
// ============================================================================

/// Registry for optional capabilities.
/// Capabilities must be explicitly registered - no auto-discovery.
///
/// # Example
/// ```ignore
/// let mut registry = CapabilityRegistry::new();
/// registry.register_oracle(Arc::new(CircuitOracle::default()));
/// registry.register_chat(Arc::new(ScriptedGroupChat::default()));
/// ```
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    /// Rich decision oracle (optional)
    oracle: Option<Arc<dyn DecisionOracle>>,
    /// Chat/workflow backend (optional)
    chat: Option<Arc<dyn ChatBackend>>,
    /// Embedding provider (optional)
    embedding: Option<Arc<dyn EmbeddingProvider>>,
}

fn not_configured(capability: &str) -> HiveError {
    HiveError::Capability(CapabilityError::Unavailable {
        capability: capability.to_string(),
        reason: "not configured".to_string(),
    })
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every rich capability wired in.
    pub fn rich(seed: Option<u64>, shots: u32, embedding_dimensions: usize) -> Self {
        let mut registry = Self::new();
        registry.register_oracle(Arc::new(CircuitOracle::new(shots, seed)));
        registry.register_chat(Arc::new(ScriptedGroupChat::default()));
        registry.register_embedding(Arc::new(HashingEmbedder::new(embedding_dimensions)));
        registry
    }

    /// Replaces any previously registered oracle.
    pub fn register_oracle(&mut self, oracle: Arc<dyn DecisionOracle>) {
        self.oracle = Some(oracle);
    }

    /// Replaces any previously registered chat backend.
    pub fn register_chat(&mut self, chat: Arc<dyn ChatBackend>) {
        self.chat = Some(chat);
    }

    /// Replaces any previously registered embedding provider.
    pub fn register_embedding(&mut self, embedding: Arc<dyn EmbeddingProvider>) {
        self.embedding = Some(embedding);
    }

    pub fn oracle(&self) -> HiveResult<Arc<dyn DecisionOracle>> {
        self.oracle.clone().ok_or_else(|| not_configured("oracle"))
    }

    pub fn chat(&self) -> HiveResult<Arc<dyn ChatBackend>> {
        self.chat.clone().ok_or_else(|| not_configured("chat"))
    }

    pub fn embedding(&self) -> HiveResult<Arc<dyn EmbeddingProvider>> {
        self.embedding.clone().ok_or_else(|| not_configured("embedding"))
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    pub fn has_chat(&self) -> bool {
        self.chat.is_some()
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    pub fn clear_chat(&mut self) {
        self.chat = None;
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("oracle", &self.oracle.as_ref().map(|o| o.name().to_string()))
            .field("chat", &self.chat.as_ref().map(|c| c.name().to_string()))
            .field("embedding", &self.embedding.as_ref().map(|e| e.model_id().to_string()))
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CapabilityRegistry::new();
        assert!(!registry.has_oracle());
        assert!(!registry.has_chat());
        assert!(!registry.has_embedding());
        assert!(matches!(
            registry.oracle(),
            Err(HiveError::Capability(CapabilityError::Unavailable { .. }))
        ));
    }

    #[test]
    fn test_registry_rich_has_everything() {
        let registry = CapabilityRegistry::rich(Some(1), 1024, 64);
        assert!(registry.has_oracle());
        assert!(registry.has_chat());
        assert_eq!(registry.embedding().unwrap().dimensions(), 64);
    }

    #[test]
    fn test_registry_clear_chat() {
        let mut registry = CapabilityRegistry::rich(None, 16, 8);
        registry.clear_chat();
        assert!(!registry.has_chat());
        assert!(registry.has_oracle());
    }
}
