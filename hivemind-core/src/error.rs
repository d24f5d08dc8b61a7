//! Error types for HIVEMIND operations

use crate::AgentId;
use thiserror::Error;

/// Memory store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Memory fragment not found: {id}")]
    NotFound { id: String },

    #[error("Memory lock poisoned")]
    LockPoisoned,

    #[error("Consolidation conflict: generation moved from {expected} to {observed}")]
    ConsolidationConflict { expected: u64, observed: u64 },

    #[error("I/O failure on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Collaboration orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Unknown collaboration pattern: {name}")]
    UnknownPattern { name: String },

    #[error("Pattern {pattern} needs at least {required} participants, found {found}")]
    InsufficientParticipants {
        pattern: String,
        required: usize,
        found: usize,
    },

    #[error("Step {step} ({role}/{task}) failed: {reason}")]
    StepExecutionFault {
        step: usize,
        role: String,
        task: String,
        reason: String,
    },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Orchestrator lock poisoned")]
    LockPoisoned,
}

/// External capability errors (oracle, chat backend, embedder).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability {capability} unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    #[error("Capability {capability} timed out after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: u64 },

    #[error("Invalid request to {capability}: {reason}")]
    InvalidRequest { capability: String, reason: String },

    #[error("Capability {capability} failed: {reason}")]
    Failed { capability: String, reason: String },
}

/// Agent collective errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not found: {agent_id}")]
    NotFound { agent_id: AgentId },

    #[error("Snapshot persistence failed for {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Unsupported snapshot schema version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Vector operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Master error type for all HIVEMIND errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HiveError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Result type alias for HIVEMIND operations.
pub type HiveResult<T> = Result<T, HiveError>;

// =============================================================================
// TESTS
// =============================================================================
