//! Explicitly constructed services the collective drives

use hivemind_capabilities::{
    CapabilityRegistry, ClassicalOracle, DecisionOracle, GuardedOracle,
};
use hivemind_core::{HiveConfig, HiveResult};
use hivemind_memory::MemoryStore;
use hivemind_orchestrator::Orchestrator;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Memory store, orchestrator and decision oracle shared by one collective.
///
/// Created once at startup and torn down with the collective. Independent
/// instances do not share state.
#[derive(Clone)]
pub struct HiveServices {
    pub memory: Arc<MemoryStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub oracle: Arc<dyn DecisionOracle>,
}

impl HiveServices {
    pub fn new(
        memory: Arc<MemoryStore>,
        orchestrator: Arc<Orchestrator>,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        Self {
            memory,
            orchestrator,
            oracle,
        }
    }

    /// Wire services from configuration and whatever capabilities are registered.
    ///
    /// The memory store uses the registered embedder when the vector backend
    /// is enabled; the orchestrator gets the chat backend and the memory
    /// store; the oracle is guarded by the configured deadline.
    pub fn from_config(config: &HiveConfig, capabilities: &CapabilityRegistry) -> HiveResult<Self> {
        let memory = match capabilities.embedding() {
            Ok(embedder) if config.memory.vector_backend => {
                MemoryStore::with_vector_index(config.memory.clone(), embedder)
            }
            _ => MemoryStore::from_config(config.memory.clone()),
        };
        let memory = Arc::new(memory);

        let mut orchestrator =
            Orchestrator::from_config(config.orchestrator.clone())?.with_memory(memory.clone());
        if let Ok(chat) = capabilities.chat() {
            orchestrator = orchestrator.with_chat(chat);
        }

        let oracle = GuardedOracle::new(
            capabilities.oracle().ok(),
            ClassicalOracle::new(config.evolution.seed),
            config.evolution.oracle_timeout(),
        );

        info!(
            memory_backend = %memory.backend_label(),
            chat_backend = %orchestrator.backend_label(),
            oracle_primary = oracle.has_primary(),
            "Services initialized"
        );

        Ok(Self::new(memory, Arc::new(orchestrator), Arc::new(oracle)))
    }

    /// Services with no rich capabilities: keyword/vector memory as configured,
    /// fallback orchestration and the classical oracle.
    pub fn deterministic(config: &HiveConfig) -> HiveResult<Self> {
        Self::from_config(config, &CapabilityRegistry::new())
    }
}

impl fmt::Debug for HiveServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiveServices")
            .field("memory", &self.memory.backend_label())
            .field("orchestrator", &self.orchestrator.backend_label())
            .field("oracle", &self.oracle.name())
            .finish()
    }
}
