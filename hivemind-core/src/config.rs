//! Configuration types
//!
//! Every value has a default, so a TOML file only needs to name what it
//! changes. Durations are stored as milliseconds and exposed as
//! [`std::time::Duration`] through accessor methods.

use crate::{ConfigError, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// MEMORY
// ============================================================================

/// Memory store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Use the vector index backend; `false` starts in keyword mode
    pub vector_backend: bool,
    /// Dimensions of hashed-token embeddings
    pub embedding_dimensions: usize,
    /// Result limit applied when a query does not set one
    pub default_max_results: usize,
    /// Fragments younger than this are never consolidated
    pub consolidation_age_days: i64,
    /// Consolidation candidates have importance at or below this
    pub consolidation_max_importance: f32,
    /// Consolidation candidates have been accessed at most this often
    pub consolidation_max_access: u32,
    /// Groups must have more than this many members to be consolidated
    pub consolidation_min_group: usize,
    /// Members quoted in the synthetic fragment's content
    pub consolidation_representatives: usize,
    /// Importance ceiling of a synthetic fragment
    pub consolidated_importance_cap: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            vector_backend: true,
            embedding_dimensions: 256,
            default_max_results: 10,
            consolidation_age_days: 30,
            consolidation_max_importance: 0.3,
            consolidation_max_access: 2,
            consolidation_min_group: 3,
            consolidation_representatives: 3,
            consolidated_importance_cap: 0.8,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Collaboration orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pacing delay between fallback workflow steps, in milliseconds
    pub step_delay_ms: u64,
    /// Deadline for a chat backend negotiation, in milliseconds
    pub backend_timeout_ms: u64,
    /// Round limit handed to the chat backend
    pub max_rounds: usize,
    /// Registered participants the rich path requires
    pub min_participants: usize,
    /// Width of the time bucket keying direct conversations, in seconds
    pub direct_bucket_secs: u64,
    /// Finished conversations beyond this count are evicted, oldest first
    pub max_retained_conversations: usize,
    /// Optional TOML file with extra collaboration patterns
    pub pattern_catalog: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 500,
            backend_timeout_ms: 30_000,
            max_rounds: 20,
            min_participants: 2,
            direct_bucket_secs: 60,
            max_retained_conversations: 1000,
            pattern_catalog: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

// ============================================================================
// EVOLUTION
// ============================================================================

/// Evolution loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Hard cap on pair attempts per epoch
    pub max_pairs_per_epoch: usize,
    /// Pacing delay between pair attempts, in milliseconds
    pub pair_delay_ms: u64,
    /// Number of leading active agents that decide each epoch
    pub decision_agents: usize,
    /// Deadline for one oracle call, in milliseconds
    pub oracle_timeout_ms: u64,
    /// Measured shots per circuit run
    pub oracle_shots: u32,
    /// Capacity of each agent's recent-fragment list
    pub memory_ref_capacity: usize,
    /// Total cached fragment refs above which local consolidation trims
    pub local_consolidation_threshold: usize,
    /// Refs each agent keeps after a local trim
    pub keep_recent_refs: usize,
    /// Integrity never drops below this
    pub integrity_floor: f64,
    /// Integrity never rises above this
    pub integrity_cap: f64,
    /// Run the memory store's consolidation every N epochs; 0 disables it
    pub store_consolidation_interval: u64,
    /// Score each partner gains from a compatible collaboration
    pub collaboration_reward: f64,
    /// Entries kept in each of the collaboration, decision and epoch logs
    pub history_retention: usize,
    /// Seed for the oracle's random source; unset draws from the OS
    pub seed: Option<u64>,
    /// Optional TOML file replacing the built-in compatibility table
    pub compatibility_table: Option<PathBuf>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            max_pairs_per_epoch: 5,
            pair_delay_ms: 50,
            decision_agents: 3,
            oracle_timeout_ms: 5_000,
            oracle_shots: 1024,
            memory_ref_capacity: 256,
            local_consolidation_threshold: 1000,
            keep_recent_refs: 5,
            integrity_floor: 80.0,
            integrity_cap: 100.0,
            store_consolidation_interval: 10,
            collaboration_reward: 1.0,
            history_retention: 1000,
            seed: None,
            compatibility_table: None,
        }
    }
}

impl EvolutionConfig {
    pub fn pair_delay(&self) -> Duration {
        Duration::from_millis(self.pair_delay_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub memory: MemoryConfig,
    pub orchestrator: OrchestratorConfig,
    pub evolution: EvolutionConfig,
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> HiveError {
    HiveError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

impl HiveConfig {
    /// Configuration with every pacing delay set to zero, for tests and batch runs.
    pub fn without_pacing() -> Self {
        let mut config = Self::default();
        config.orchestrator.step_delay_ms = 0;
        config.evolution.pair_delay_ms = 0;
        config
    }

    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(source: &str) -> HiveResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            HiveError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> HiveResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            HiveError::Config(ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `HIVEMIND_*` environment variables on top of this configuration.
    ///
    /// Recognized variables:
    /// - `HIVEMIND_VECTOR_BACKEND` (bool)
    /// - `HIVEMIND_STEP_DELAY_MS`, `HIVEMIND_BACKEND_TIMEOUT_MS`
    /// - `HIVEMIND_PAIR_DELAY_MS`, `HIVEMIND_ORACLE_TIMEOUT_MS`
    /// - `HIVEMIND_MAX_PAIRS`, `HIVEMIND_CONSOLIDATION_INTERVAL`
    /// - `HIVEMIND_SEED`
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an explicit lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "HIVEMIND_VECTOR_BACKEND") {
            self.memory.vector_backend = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_STEP_DELAY_MS") {
            self.orchestrator.step_delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_BACKEND_TIMEOUT_MS") {
            self.orchestrator.backend_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_PAIR_DELAY_MS") {
            self.evolution.pair_delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_ORACLE_TIMEOUT_MS") {
            self.evolution.oracle_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_MAX_PAIRS") {
            self.evolution.max_pairs_per_epoch = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_CONSOLIDATION_INTERVAL") {
            self.evolution.store_consolidation_interval = v;
        }
        if let Some(v) = parsed(&lookup, "HIVEMIND_SEED") {
            self.evolution.seed = Some(v);
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> HiveResult<()> {
        let memory = &self.memory;
        if memory.embedding_dimensions == 0 {
            return Err(invalid(
                "memory.embedding_dimensions",
                memory.embedding_dimensions,
                "embedding_dimensions must be greater than 0",
            ));
        }
        if memory.default_max_results == 0 {
            return Err(invalid(
                "memory.default_max_results",
                memory.default_max_results,
                "default_max_results must be greater than 0",
            ));
        }
        if memory.consolidation_age_days < 0 {
            return Err(invalid(
                "memory.consolidation_age_days",
                memory.consolidation_age_days,
                "consolidation_age_days must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&memory.consolidation_max_importance) {
            return Err(invalid(
                "memory.consolidation_max_importance",
                memory.consolidation_max_importance,
                "consolidation_max_importance must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&memory.consolidated_importance_cap) {
            return Err(invalid(
                "memory.consolidated_importance_cap",
                memory.consolidated_importance_cap,
                "consolidated_importance_cap must be between 0.0 and 1.0",
            ));
        }
        if memory.consolidation_representatives == 0 {
            return Err(invalid(
                "memory.consolidation_representatives",
                memory.consolidation_representatives,
                "consolidation_representatives must be greater than 0",
            ));
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.backend_timeout_ms == 0 {
            return Err(invalid(
                "orchestrator.backend_timeout_ms",
                orchestrator.backend_timeout_ms,
                "backend_timeout_ms must be positive",
            ));
        }
        if orchestrator.max_rounds == 0 {
            return Err(invalid(
                "orchestrator.max_rounds",
                orchestrator.max_rounds,
                "max_rounds must be greater than 0",
            ));
        }
        if orchestrator.direct_bucket_secs == 0 {
            return Err(invalid(
                "orchestrator.direct_bucket_secs",
                orchestrator.direct_bucket_secs,
                "direct_bucket_secs must be positive",
            ));
        }
        if orchestrator.max_retained_conversations == 0 {
            return Err(invalid(
                "orchestrator.max_retained_conversations",
                orchestrator.max_retained_conversations,
                "max_retained_conversations must be greater than 0",
            ));
        }

        let evolution = &self.evolution;
        if evolution.oracle_timeout_ms == 0 {
            return Err(invalid(
                "evolution.oracle_timeout_ms",
                evolution.oracle_timeout_ms,
                "oracle_timeout_ms must be positive",
            ));
        }
        if evolution.oracle_shots == 0 {
            return Err(invalid(
                "evolution.oracle_shots",
                evolution.oracle_shots,
                "oracle_shots must be greater than 0",
            ));
        }
        if evolution.memory_ref_capacity < evolution.keep_recent_refs {
            return Err(invalid(
                "evolution.memory_ref_capacity",
                evolution.memory_ref_capacity,
                "memory_ref_capacity must be at least keep_recent_refs",
            ));
        }
        if !(0.0..=100.0).contains(&evolution.integrity_cap) {
            return Err(invalid(
                "evolution.integrity_cap",
                evolution.integrity_cap,
                "integrity_cap must be between 0 and 100",
            ));
        }
        if evolution.integrity_floor < 0.0 || evolution.integrity_floor > evolution.integrity_cap {
            return Err(invalid(
                "evolution.integrity_floor",
                evolution.integrity_floor,
                "integrity_floor must be between 0 and integrity_cap",
            ));
        }
        if evolution.collaboration_reward < 0.0 {
            return Err(invalid(
                "evolution.collaboration_reward",
                evolution.collaboration_reward,
                "collaboration_reward must be non-negative",
            ));
        }
        if evolution.history_retention == 0 {
            return Err(invalid(
                "evolution.history_retention",
                evolution.history_retention,
                "history_retention must be greater than 0",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
