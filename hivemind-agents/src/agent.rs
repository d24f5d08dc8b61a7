//! Agent state

use chrono::Utc;
use hivemind_core::{
    clamp_level, clamp_unit, new_agent_id, stable_hash, AgentId, AgentRole, AgentTier,
    FragmentId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Upper bound of the curiosity gauge.
pub const MAX_CURIOSITY: f64 = 100.0;

/// Curiosity added by a spark when the caller has no specific amount.
pub const DEFAULT_SPARK: f64 = 10.0;

/// Coherence every agent starts with.
pub const INITIAL_COHERENCE: f64 = 0.5;

/// Curiosity an agent of `role` starts with: `50 + stable_hash(role) mod 50`.
pub fn initial_curiosity(role: AgentRole) -> f64 {
    50.0 + (stable_hash(role.as_str()) % 50) as f64
}

/// An agent in the collective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier for this agent
    pub id: AgentId,
    pub role: AgentRole,
    pub tier: AgentTier,
    /// Tools this agent may use
    pub tools: Vec<String>,
    /// Curiosity gauge in [0, 100]
    pub curiosity: f64,
    /// Inactive agents are skipped by the evolution loop
    pub active: bool,
    /// Label of the most recent action
    pub last_action: Option<String>,
    /// Recent memory fragment ids, oldest first
    pub memory_refs: VecDeque<FragmentId>,
    /// Coherence of the last decision, in [0, 1]
    pub quantum_coherence: f64,
    /// Cumulative collaboration score
    pub collaboration_score: f64,
    /// When this agent was created
    pub created_at: Timestamp,
}

impl Agent {
    /// Create a new active agent.
    pub fn new(role: AgentRole, tier: AgentTier, tools: Vec<String>) -> Self {
        Self {
            id: new_agent_id(),
            role,
            tier,
            tools,
            curiosity: initial_curiosity(role),
            active: true,
            last_action: None,
            memory_refs: VecDeque::new(),
            quantum_coherence: INITIAL_COHERENCE,
            collaboration_score: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Check if agent has a specific tool.
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }

    /// Cache a fragment reference, evicting the oldest beyond `capacity`.
    pub fn remember(&mut self, fragment_id: FragmentId, capacity: usize) {
        if capacity == 0 {
            return;
        }
        self.memory_refs.push_back(fragment_id);
        while self.memory_refs.len() > capacity {
            self.memory_refs.pop_front();
        }
    }

    /// Keep only the `keep` most recent fragment references.
    pub fn trim_refs(&mut self, keep: usize) {
        while self.memory_refs.len() > keep {
            self.memory_refs.pop_front();
        }
    }

    /// Raise (or lower) curiosity, clamped to [0, 100].
    pub fn add_curiosity(&mut self, amount: f64) {
        self.curiosity = clamp_level(self.curiosity + amount, 0.0, MAX_CURIOSITY);
    }

    /// Set coherence, clamped to [0, 1].
    pub fn set_coherence(&mut self, coherence: f64) {
        self.quantum_coherence = clamp_unit(coherence);
    }
}
