//! Immutable records produced by the collective

use crate::agent::Agent;
use hivemind_capabilities::Provenance;
use hivemind_core::{AgentId, AgentRole, Timestamp};
use hivemind_memory::ConsolidationReport;
use hivemind_orchestrator::ConversationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot schema version written by this build.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Outcome of one pairwise collaboration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRecord {
    pub initiator: AgentId,
    pub collaborator: AgentId,
    pub initiator_role: AgentRole,
    pub collaborator_role: AgentRole,
    pub task: String,
    pub timestamp: Timestamp,
    pub success: bool,
    /// Free-text outcome
    pub outcome: String,
    /// Conversation the collaboration was delegated to, when one was created
    pub conversation_id: Option<ConversationId>,
}

/// One tie-break decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub agent_id: AgentId,
    pub agent_role: AgentRole,
    pub options: Vec<String>,
    pub selected: String,
    pub coherence: f64,
    pub provenance: Provenance,
    pub timestamp: Timestamp,
}

/// Label describing how the collective's recent decisions were made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantumState {
    /// No decision made yet
    Initializing,
    /// The last epoch had at least one oracle decision
    Coherent,
    /// The last epoch's decisions all fell back to the classical oracle
    Classical,
}

impl QuantumState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantumState::Initializing => "INITIALIZING",
            QuantumState::Coherent => "COHERENT",
            QuantumState::Classical => "CLASSICAL",
        }
    }
}

impl fmt::Display for QuantumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of the collective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveSnapshot {
    pub schema_version: u32,
    pub epoch: u64,
    pub genesis_time: Timestamp,
    pub uptime_seconds: f64,
    pub active_agents: Vec<Agent>,
    pub total_collaborations: usize,
    pub quantum_state: QuantumState,
    /// Memory integrity gauge in [80, 100]
    pub memory_integrity: f64,
    pub system_status: String,
}

/// Result of one `evolve` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: u64,
    pub duration_ms: f64,
    pub active_agents: usize,
    /// Collaboration attempts made this epoch
    pub collaborations: usize,
    pub successful_collaborations: usize,
    pub decisions: usize,
    pub memory_integrity: f64,
    /// Cached fragment references across all agents before trimming
    pub total_fragment_refs: usize,
    /// Whether agent reference lists were trimmed
    pub cleanup_performed: bool,
    /// Store consolidation outcome when it ran this epoch
    pub store_consolidation: Option<ConsolidationReport>,
    pub snapshot: HiveSnapshot,
}
