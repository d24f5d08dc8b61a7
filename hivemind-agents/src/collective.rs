//! The agent collective and its evolution loop

use crate::agent::Agent;
use crate::compatibility::CompatibilityTable;
use crate::records::{
    CollaborationRecord, DecisionRecord, EpochReport, HiveSnapshot, QuantumState,
    SNAPSHOT_SCHEMA_VERSION,
};
use crate::services::HiveServices;
use crate::tables::{pattern_for_task, CANONICAL_ROSTER, COLLABORATION_TASKS, DECISION_SCENARIOS};
use chrono::Utc;
use hivemind_capabilities::Provenance;
use hivemind_core::{
    clamp_level, write_atomic, AgentError, AgentId, AgentRole, AgentTier, EvolutionConfig,
    HiveConfig, HiveError, HiveResult, MemoryType, Timestamp,
};
use hivemind_memory::ConsolidationReport;
use hivemind_orchestrator::ConversationId;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Importance of the shared fragment a successful collaboration writes.
const COLLABORATION_IMPORTANCE: f32 = 0.5;

/// Importance of decision fragments.
const DECISION_IMPORTANCE: f32 = 0.4;

const SYSTEM_STATUS: &str = "OPERATIONAL";

/// Drop the oldest entries so at most `limit` remain.
fn retain_latest<T>(log: &mut Vec<T>, limit: usize) {
    if log.len() > limit {
        log.drain(..log.len() - limit);
    }
}

fn persistence_error(path: &Path, reason: impl fmt::Display) -> HiveError {
    HiveError::Agent(AgentError::Persistence {
        path: path.display().to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// COLLECTIVE
// ============================================================================

/// A roster of agents evolving in epochs.
///
/// `evolve` takes `&mut self`, so at most one epoch runs at a time.
pub struct Collective {
    config: EvolutionConfig,
    services: HiveServices,
    compatibility: CompatibilityTable,
    /// Keyed by id; iteration order is the pair order
    agents: BTreeMap<AgentId, Agent>,
    epoch: u64,
    genesis_time: Timestamp,
    quantum_state: QuantumState,
    memory_integrity: f64,
    /// Cumulative, including records trimmed from the history
    total_collaborations: usize,
    collaboration_history: Vec<CollaborationRecord>,
    decision_log: Vec<DecisionRecord>,
    evolution_log: Vec<EpochReport>,
}

impl Collective {
    /// Empty collective. The compatibility table comes from
    /// `config.compatibility_table` when set, else the built-in table.
    pub fn new(config: EvolutionConfig, services: HiveServices) -> HiveResult<Self> {
        let compatibility = match &config.compatibility_table {
            Some(path) => CompatibilityTable::load(path)?,
            None => CompatibilityTable::builtin(),
        };
        Ok(Self {
            memory_integrity: config.integrity_cap,
            config,
            services,
            compatibility,
            agents: BTreeMap::new(),
            epoch: 0,
            genesis_time: Utc::now(),
            quantum_state: QuantumState::Initializing,
            total_collaborations: 0,
            collaboration_history: Vec::new(),
            decision_log: Vec::new(),
            evolution_log: Vec::new(),
        })
    }

    /// Collective with the canonical eight-agent roster, each registered
    /// with the orchestrator.
    pub fn genesis(config: &HiveConfig, services: HiveServices) -> HiveResult<Self> {
        let mut collective = Self::new(config.evolution.clone(), services)?;
        for entry in CANONICAL_ROSTER {
            let tools = entry.tools.iter().map(|t| t.to_string()).collect();
            collective.spawn(entry.role, entry.tier, tools)?;
        }
        info!(agents = collective.agents.len(), "Initialized collective");
        Ok(collective)
    }

    pub fn with_compatibility(mut self, table: CompatibilityTable) -> Self {
        self.compatibility = table;
        self
    }

    /// Add an agent and register it with the orchestrator.
    pub fn spawn(&mut self, role: AgentRole, tier: AgentTier, tools: Vec<String>) -> HiveResult<AgentId> {
        let agent = Agent::new(role, tier, tools);
        let briefing = format!(
            "You are the {} of the collective ({} tier). Tools: {}.",
            role,
            tier,
            agent.tools.join(", ")
        );
        self.services
            .orchestrator
            .register_agent(agent.id, role, briefing, agent.tools.clone())?;
        let id = agent.id;
        debug!(agent_id = %id, role = %role, curiosity = agent.curiosity, "Spawned agent");
        self.agents.insert(id, agent);
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn services(&self) -> &HiveServices {
        &self.services
    }

    pub fn compatibility(&self) -> &CompatibilityTable {
        &self.compatibility
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn memory_integrity(&self) -> f64 {
        self.memory_integrity
    }

    pub fn quantum_state(&self) -> QuantumState {
        self.quantum_state
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// All agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// First agent (in id order) with `role`.
    pub fn get_by_role(&self, role: AgentRole) -> Option<&Agent> {
        self.agents.values().find(|agent| agent.role == role)
    }

    pub fn collaboration_history(&self) -> &[CollaborationRecord] {
        &self.collaboration_history
    }

    pub fn decision_log(&self) -> &[DecisionRecord] {
        &self.decision_log
    }

    pub fn evolution_log(&self) -> &[EpochReport] {
        &self.evolution_log
    }

    // ------------------------------------------------------------------------
    // Agent mutation
    // ------------------------------------------------------------------------

    /// Raise an agent's curiosity, clamped to [0, 100]. Unknown ids are ignored.
    pub fn inject_spark(&mut self, id: AgentId, amount: f64) -> bool {
        match self.agents.get_mut(&id) {
            Some(agent) => {
                agent.add_curiosity(amount);
                info!(agent_id = %id, amount, curiosity = agent.curiosity, "Injected spark");
                true
            }
            None => false,
        }
    }

    pub fn deactivate(&mut self, id: AgentId) -> HiveResult<()> {
        self.set_active(id, false)
    }

    pub fn activate(&mut self, id: AgentId) -> HiveResult<()> {
        self.set_active(id, true)
    }

    fn set_active(&mut self, id: AgentId, active: bool) -> HiveResult<()> {
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or(AgentError::NotFound { agent_id: id })?;
        agent.active = active;
        info!(agent_id = %id, active, "Agent activity changed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Evolution
    // ------------------------------------------------------------------------

    /// Run one epoch: collaborations, decisions, memory upkeep, snapshot.
    pub async fn evolve(&mut self) -> HiveResult<EpochReport> {
        self.epoch += 1;
        let started = Instant::now();
        info!(epoch = self.epoch, "Evolution cycle started");

        let roster: Vec<(AgentId, AgentRole)> = self
            .agents
            .values()
            .filter(|agent| agent.active)
            .map(|agent| (agent.id, agent.role))
            .collect();

        let collaborations = self.collaborate(&roster).await;
        let successful = collaborations.iter().filter(|c| c.success).count();
        let collaboration_count = collaborations.len();
        self.total_collaborations += collaboration_count;
        self.collaboration_history.extend(collaborations);
        retain_latest(&mut self.collaboration_history, self.config.history_retention);

        let decisions = self.decide(&roster).await;
        let decision_count = decisions.len();
        if decisions.iter().any(|d| d.provenance == Provenance::Oracle) {
            self.quantum_state = QuantumState::Coherent;
        } else if !decisions.is_empty() {
            self.quantum_state = QuantumState::Classical;
        }
        self.decision_log.extend(decisions);
        retain_latest(&mut self.decision_log, self.config.history_retention);

        let (total_fragment_refs, cleanup_performed) = self.consolidate_local();
        let store_consolidation = self.consolidate_store().await;

        let snapshot = self.snapshot();
        let report = EpochReport {
            epoch: self.epoch,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            active_agents: roster.len(),
            collaborations: collaboration_count,
            successful_collaborations: successful,
            decisions: decision_count,
            memory_integrity: self.memory_integrity,
            total_fragment_refs,
            cleanup_performed,
            store_consolidation,
            snapshot,
        };
        self.evolution_log.push(report.clone());
        retain_latest(&mut self.evolution_log, self.config.history_retention);

        info!(
            epoch = report.epoch,
            duration_ms = report.duration_ms,
            collaborations = report.collaborations,
            decisions = report.decisions,
            memory_integrity = report.memory_integrity,
            "Evolution cycle completed"
        );
        Ok(report)
    }

    async fn collaborate(&mut self, roster: &[(AgentId, AgentRole)]) -> Vec<CollaborationRecord> {
        let mut records = Vec::new();
        let cap = self.config.max_pairs_per_epoch;

        'pairs: for (i, &(initiator, initiator_role)) in roster.iter().enumerate() {
            for &(collaborator, collaborator_role) in &roster[i + 1..] {
                if records.len() >= cap {
                    break 'pairs;
                }
                if !records.is_empty() {
                    let delay = self.config.pair_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }

                let task = COLLABORATION_TASKS[records.len() % COLLABORATION_TASKS.len()];

                let record = if self.compatibility.is_compatible(initiator_role, collaborator_role) {
                    self.succeed(initiator, initiator_role, collaborator, collaborator_role, task)
                        .await
                } else {
                    info!(
                        initiator = %initiator,
                        collaborator = %collaborator,
                        task,
                        "Collaboration rejected: role incompatibility"
                    );
                    CollaborationRecord {
                        initiator,
                        collaborator,
                        initiator_role,
                        collaborator_role,
                        task: task.to_string(),
                        timestamp: Utc::now(),
                        success: false,
                        outcome: format!(
                            "Role incompatibility: {} + {}",
                            initiator_role, collaborator_role
                        ),
                        conversation_id: None,
                    }
                };
                records.push(record);
            }
        }
        records
    }

    async fn succeed(
        &mut self,
        initiator: AgentId,
        initiator_role: AgentRole,
        collaborator: AgentId,
        collaborator_role: AgentRole,
        task: &str,
    ) -> CollaborationRecord {
        let reward = self.config.collaboration_reward;
        let capacity = self.config.memory_ref_capacity;

        let content = format!(
            "{} collaborated with {} on {}",
            initiator_role, collaborator_role, task
        );
        let tags = vec![
            task.to_string(),
            "collaboration".to_string(),
            collaborator_role.to_string(),
        ];
        let fragment = match self
            .services
            .memory
            .store_experience(
                initiator,
                initiator_role.as_str(),
                content,
                MemoryType::Experience,
                COLLABORATION_IMPORTANCE,
                tags,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(initiator = %initiator, task, error = %err, "Failed to store collaboration memory");
                None
            }
        };

        for id in [initiator, collaborator] {
            if let Some(agent) = self.agents.get_mut(&id) {
                agent.collaboration_score += reward;
                if let Some(fragment) = &fragment {
                    agent.remember(fragment.clone(), capacity);
                }
            }
        }

        let conversation_id = self
            .delegate(initiator, initiator_role, collaborator, collaborator_role, task)
            .await;

        info!(initiator = %initiator, collaborator = %collaborator, task, "Collaboration succeeded");
        CollaborationRecord {
            initiator,
            collaborator,
            initiator_role,
            collaborator_role,
            task: task.to_string(),
            timestamp: Utc::now(),
            success: true,
            outcome: format!("Successfully collaborated on {}", task),
            conversation_id,
        }
    }

    async fn delegate(
        &self,
        initiator: AgentId,
        initiator_role: AgentRole,
        collaborator: AgentId,
        collaborator_role: AgentRole,
        task: &str,
    ) -> Option<ConversationId> {
        let Some(pattern) = pattern_for_task(task) else {
            debug!(task, "No collaboration pattern for task");
            return None;
        };
        let context: HashMap<String, Value> = HashMap::from([
            ("task".to_string(), json!(task)),
            ("initiator".to_string(), json!(initiator.to_string())),
            ("initiator_role".to_string(), json!(initiator_role.as_str())),
            ("collaborator".to_string(), json!(collaborator.to_string())),
            ("collaborator_role".to_string(), json!(collaborator_role.as_str())),
            ("epoch".to_string(), json!(self.epoch)),
        ]);
        match self.services.orchestrator.initiate(pattern, context).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(task, pattern, error = %err, "Collaboration delegation failed");
                None
            }
        }
    }

    async fn decide(&mut self, roster: &[(AgentId, AgentRole)]) -> Vec<DecisionRecord> {
        let mut records = Vec::new();
        let capacity = self.config.memory_ref_capacity;

        for &(agent_id, agent_role) in roster.iter().take(self.config.decision_agents) {
            let scenario = DECISION_SCENARIOS[records.len() % DECISION_SCENARIOS.len()];
            let options: Vec<String> = scenario.iter().map(|s| s.to_string()).collect();

            let decision = match self.services.oracle.choose(&options).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(agent_id = %agent_id, error = %err, "Decision failed");
                    continue;
                }
            };

            let content = format!(
                "Chose {} from [{}] with coherence {:.3} ({})",
                decision.selected,
                options.join(", "),
                decision.coherence,
                decision.provenance
            );
            let fragment = self
                .services
                .memory
                .store_experience(
                    agent_id,
                    agent_role.as_str(),
                    content,
                    MemoryType::Decision,
                    DECISION_IMPORTANCE,
                    vec!["decision".to_string(), decision.provenance.to_string()],
                )
                .await;

            if let Some(agent) = self.agents.get_mut(&agent_id) {
                agent.set_coherence(decision.coherence);
                agent.last_action = Some(match decision.provenance {
                    Provenance::Oracle => format!("quantum_decision_{}", decision.index),
                    Provenance::Fallback => "classical_fallback".to_string(),
                });
                match fragment {
                    Ok(id) => agent.remember(id, capacity),
                    Err(err) => {
                        warn!(agent_id = %agent_id, error = %err, "Failed to store decision memory")
                    }
                }
                info!(
                    agent_id = %agent_id,
                    selected = %decision.selected,
                    coherence = agent.quantum_coherence,
                    provenance = %decision.provenance,
                    "Decision made"
                );
            }

            records.push(DecisionRecord {
                agent_id,
                agent_role,
                options,
                selected: decision.selected,
                coherence: decision.coherence,
                provenance: decision.provenance,
                timestamp: Utc::now(),
            });
        }
        records
    }

    /// Trim cached references when the collective holds too many.
    /// Returns the pre-trim total and whether trimming happened.
    fn consolidate_local(&mut self) -> (usize, bool) {
        let total: usize = self.agents.values().map(|a| a.memory_refs.len()).sum();
        let cleanup = total > self.config.local_consolidation_threshold;
        if cleanup {
            for agent in self.agents.values_mut() {
                agent.trim_refs(self.config.keep_recent_refs);
            }
            self.memory_integrity = clamp_level(
                self.memory_integrity - 1.0,
                self.config.integrity_floor,
                self.config.integrity_cap,
            );
            info!(total_refs = total, integrity = self.memory_integrity, "Trimmed agent memory references");
        } else {
            self.memory_integrity = clamp_level(
                self.memory_integrity + 0.1,
                self.config.integrity_floor,
                self.config.integrity_cap,
            );
        }
        (total, cleanup)
    }

    async fn consolidate_store(&self) -> Option<ConsolidationReport> {
        let interval = self.config.store_consolidation_interval;
        if interval == 0 || self.epoch % interval != 0 {
            return None;
        }
        match self.services.memory.consolidate(None).await {
            Ok(report) => {
                info!(
                    processed = report.processed,
                    consolidated = report.consolidated,
                    freed = report.freed,
                    skipped_conflicts = report.skipped_conflicts,
                    "Memory store consolidated"
                );
                Some(report)
            }
            Err(err) => {
                warn!(error = %err, "Memory store consolidation failed");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> HiveSnapshot {
        let now = Utc::now();
        HiveSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            epoch: self.epoch,
            genesis_time: self.genesis_time,
            uptime_seconds: (now - self.genesis_time).num_milliseconds() as f64 / 1000.0,
            active_agents: self.agents.values().filter(|a| a.active).cloned().collect(),
            total_collaborations: self.total_collaborations,
            quantum_state: self.quantum_state,
            memory_integrity: self.memory_integrity,
            system_status: SYSTEM_STATUS.to_string(),
        }
    }

    /// Write the current snapshot as pretty JSON, atomically.
    pub fn persist_snapshot(&self, path: &Path) -> HiveResult<HiveSnapshot> {
        let snapshot = self.snapshot();
        let bytes =
            serde_json::to_vec_pretty(&snapshot).map_err(|e| persistence_error(path, e))?;
        write_atomic(path, &bytes).map_err(|e| persistence_error(path, e))?;
        info!(path = %path.display(), epoch = snapshot.epoch, "Snapshot persisted");
        Ok(snapshot)
    }

    /// Read a persisted snapshot. Newer schema versions are rejected.
    pub fn load_snapshot(path: &Path) -> HiveResult<HiveSnapshot> {
        let bytes = std::fs::read(path).map_err(|e| persistence_error(path, e))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| persistence_error(path, e))?;
        let version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| persistence_error(path, "missing schema_version"))?;
        if version > u64::from(SNAPSHOT_SCHEMA_VERSION) {
            return Err(AgentError::UnsupportedSchema {
                found: u32::try_from(version).unwrap_or(u32::MAX),
                supported: SNAPSHOT_SCHEMA_VERSION,
            }
            .into());
        }
        serde_json::from_value(value).map_err(|e| persistence_error(path, e))
    }
}

impl fmt::Debug for Collective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collective")
            .field("epoch", &self.epoch)
            .field("agents", &self.agents.len())
            .field("quantum_state", &self.quantum_state)
            .field("memory_integrity", &self.memory_integrity)
            .field("services", &self.services)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_memory::MemoryQuery;

    fn config() -> HiveConfig {
        let mut config = HiveConfig::without_pacing();
        config.evolution.seed = Some(42);
        config
    }

    fn genesis() -> Collective {
        let config = config();
        let services = HiveServices::deterministic(&config).unwrap();
        Collective::genesis(&config, services).unwrap()
    }

    #[test]
    fn test_genesis_roster() {
        let collective = genesis();
        assert_eq!(collective.agents().count(), 8);
        for role in AgentRole::ALL {
            assert!(collective.get_by_role(role).is_some());
        }
        let navigator = collective.get_by_role(AgentRole::Navigator).unwrap();
        assert_eq!(navigator.tier, AgentTier::Orchestrator);
        assert!(navigator.has_tool("Qiskit"));
        assert_eq!(collective.services().orchestrator.agent_count().unwrap(), 8);
        assert_eq!(collective.quantum_state(), QuantumState::Initializing);
        assert_eq!(collective.memory_integrity(), 100.0);
    }

    #[tokio::test]
    async fn test_evolve_once() {
        let mut collective = genesis();
        let report = collective.evolve().await.unwrap();

        assert_eq!(report.epoch, 1);
        assert_eq!(collective.epoch(), 1);
        assert_eq!(report.collaborations, 5);
        assert!(report.decisions <= 3);
        assert_eq!(report.snapshot.active_agents.len(), 8);
        assert_eq!(report.snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert_eq!(collective.evolution_log().len(), 1);
        assert_eq!(collective.collaboration_history().len(), 5);
        // Integrity starts at the cap and cannot grow past it
        assert_eq!(report.memory_integrity, 100.0);
        assert_eq!(collective.quantum_state(), QuantumState::Classical);
    }

    #[tokio::test]
    async fn test_pairs_follow_id_order() {
        let mut collective = genesis();
        collective.evolve().await.unwrap();

        let ids: Vec<AgentId> = collective.agents().map(|a| a.id).collect();
        let expected: Vec<(AgentId, AgentId)> = (1..=5).map(|j| (ids[0], ids[j])).collect();
        let actual: Vec<(AgentId, AgentId)> = collective
            .collaboration_history()
            .iter()
            .map(|c| (c.initiator, c.collaborator))
            .collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_successful_collaboration_effects() {
        let config = config();
        let services = HiveServices::deterministic(&config).unwrap();
        let mut collective = Collective::new(config.evolution.clone(), services).unwrap();
        let engineer = collective.spawn(AgentRole::Engineer, AgentTier::Orchestrator, vec![]).unwrap();
        let designer = collective.spawn(AgentRole::Designer, AgentTier::ToolUser, vec![]).unwrap();

        let report = collective.evolve().await.unwrap();
        assert_eq!(report.collaborations, 1);
        assert_eq!(report.successful_collaborations, 1);

        let record = &collective.collaboration_history()[0];
        assert!(record.success);
        assert_eq!(record.task, "solar_yield_analysis");
        assert_eq!(record.outcome, "Successfully collaborated on solar_yield_analysis");
        let conversation_id = record.conversation_id.clone().unwrap();
        let status = collective
            .services()
            .orchestrator
            .status(&conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(status.topic, "Review solar system design for technical and financial viability");

        for id in [engineer, designer] {
            let agent = collective.agent(id).unwrap();
            assert_eq!(agent.collaboration_score, 1.0);
            // one shared collaboration fragment plus one decision fragment
            assert_eq!(agent.memory_refs.len(), 2);
        }
        let shared = collective.agent(engineer).unwrap().memory_refs[0].clone();
        assert_eq!(collective.agent(designer).unwrap().memory_refs[0], shared);

        let stored = collective.services().memory.get(&shared).await.unwrap().unwrap();
        assert!(stored.content.contains("solar_yield_analysis"));
        assert_eq!(stored.memory_type, MemoryType::Experience);
    }

    #[tokio::test]
    async fn test_incompatible_pair_records_failure() {
        let config = config();
        let services = HiveServices::deterministic(&config).unwrap();
        let mut collective = Collective::new(config.evolution.clone(), services).unwrap();
        let engineer = collective.spawn(AgentRole::Engineer, AgentTier::Raw, vec![]).unwrap();
        collective.spawn(AgentRole::Philosopher, AgentTier::Sage, vec![]).unwrap();

        collective.evolve().await.unwrap();

        let record = &collective.collaboration_history()[0];
        assert!(!record.success);
        assert!(record.outcome.starts_with("Role incompatibility"));
        assert!(record.conversation_id.is_none());
        assert_eq!(collective.agent(engineer).unwrap().collaboration_score, 0.0);
        assert_eq!(collective.services().orchestrator.stats().unwrap().total_conversations, 0);
    }

    #[tokio::test]
    async fn test_rotations_restart_every_epoch() {
        let mut collective = genesis();
        collective.evolve().await.unwrap();
        collective.evolve().await.unwrap();

        let options: Vec<Vec<String>> = collective
            .decision_log()
            .iter()
            .map(|d| d.options.clone())
            .collect();
        assert_eq!(options.len(), 6);
        for (i, opts) in options.iter().enumerate() {
            let expected: Vec<String> = DECISION_SCENARIOS[(i % 3) % DECISION_SCENARIOS.len()]
                .iter()
                .map(|s| s.to_string())
                .collect();
            assert_eq!(opts, &expected);
        }
        for decision in collective.decision_log() {
            assert_eq!(decision.provenance, Provenance::Fallback);
            assert_eq!(decision.coherence, 0.0);
            assert!(decision.options.contains(&decision.selected));
        }
        let first = collective.agents().next().unwrap();
        assert_eq!(first.last_action.as_deref(), Some("classical_fallback"));

        let tasks: Vec<&str> = collective
            .collaboration_history()
            .iter()
            .map(|c| c.task.as_str())
            .collect();
        assert_eq!(tasks.len(), 10);
        assert_eq!(tasks[..5], COLLABORATION_TASKS[..5]);
        assert_eq!(tasks[5..], COLLABORATION_TASKS[..5]);
    }

    #[tokio::test]
    async fn test_logs_keep_latest_entries() {
        let mut config = config();
        config.evolution.history_retention = 2;
        let services = HiveServices::deterministic(&config).unwrap();
        let mut collective = Collective::genesis(&config, services).unwrap();
        for _ in 0..3 {
            collective.evolve().await.unwrap();
        }

        let epochs: Vec<u64> = collective.evolution_log().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![2, 3]);
        assert_eq!(collective.collaboration_history().len(), 2);
        assert_eq!(collective.decision_log().len(), 2);
        assert_eq!(collective.snapshot().total_collaborations, 15);
    }

    #[tokio::test]
    async fn test_local_consolidation_trims_and_decays_integrity() {
        let mut config = config();
        config.evolution.local_consolidation_threshold = 3;
        config.evolution.keep_recent_refs = 1;
        let services = HiveServices::deterministic(&config).unwrap();
        let mut collective = Collective::genesis(&config, services).unwrap();

        collective.evolve().await.unwrap();
        let report = collective.evolve().await.unwrap();

        assert!(report.cleanup_performed);
        assert!(collective.agents().all(|a| a.memory_refs.len() <= 1));
        assert!(report.memory_integrity < 100.0);
        assert!(report.memory_integrity >= 80.0);
    }

    #[tokio::test]
    async fn test_store_consolidation_interval() {
        let mut config = config();
        config.evolution.store_consolidation_interval = 2;
        let services = HiveServices::deterministic(&config).unwrap();
        let mut collective = Collective::genesis(&config, services).unwrap();

        let first = collective.evolve().await.unwrap();
        let second = collective.evolve().await.unwrap();
        assert!(first.store_consolidation.is_none());
        assert!(second.store_consolidation.is_some());
    }

    #[tokio::test]
    async fn test_inactive_agents_sit_out() {
        let mut collective = genesis();
        let ids: Vec<AgentId> = collective.agents().map(|a| a.id).collect();
        for id in &ids[2..] {
            collective.deactivate(*id).unwrap();
        }
        let report = collective.evolve().await.unwrap();
        assert_eq!(report.active_agents, 2);
        assert_eq!(report.collaborations, 1);
        assert_eq!(report.decisions, 2);
        assert_eq!(report.snapshot.active_agents.len(), 2);

        collective.activate(ids[2]).unwrap();
        assert!(collective.agent(ids[2]).unwrap().active);
    }

    #[test]
    fn test_activate_unknown_agent() {
        let mut collective = genesis();
        let err = collective.deactivate(uuid::Uuid::nil()).unwrap_err();
        assert!(matches!(err, HiveError::Agent(AgentError::NotFound { .. })));
    }

    #[test]
    fn test_inject_spark() {
        let mut collective = genesis();
        let id = collective.get_by_role(AgentRole::Philosopher).unwrap().id;
        assert!(collective.inject_spark(id, 1_000.0));
        assert_eq!(collective.agent(id).unwrap().curiosity, 100.0);
        assert!(!collective.inject_spark(uuid::Uuid::nil(), crate::agent::DEFAULT_SPARK));

        let analyst = collective.get_by_role(AgentRole::Analyst).unwrap().id;
        collective.inject_spark(analyst, -1_000.0);
        collective.inject_spark(analyst, crate::agent::DEFAULT_SPARK);
        assert_eq!(collective.agent(analyst).unwrap().curiosity, 10.0);
    }

    #[tokio::test]
    async fn test_snapshot_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.json");
        let mut collective = genesis();
        collective.evolve().await.unwrap();

        let written = collective.persist_snapshot(&path).unwrap();
        let loaded = Collective::load_snapshot(&path).unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.epoch, 1);

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], json!(1));
        assert_eq!(raw["system_status"], json!("OPERATIONAL"));
    }

    #[test]
    fn test_load_snapshot_rejects_future_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        let collective = genesis();
        let mut raw = serde_json::to_value(collective.snapshot()).unwrap();
        raw["schema_version"] = json!(99);
        std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let err = Collective::load_snapshot(&path).unwrap_err();
        assert_eq!(
            err,
            HiveError::Agent(AgentError::UnsupportedSchema {
                found: 99,
                supported: 1
            })
        );
    }

    #[tokio::test]
    async fn test_decision_fragments_are_queryable() {
        let mut collective = genesis();
        collective.evolve().await.unwrap();
        let decisions = collective
            .services()
            .memory
            .query(&MemoryQuery::new("").with_types(vec![MemoryType::Decision]).with_max_results(50))
            .await
            .unwrap();
        assert_eq!(decisions.len(), 3);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Curiosity and coherence stay bounded through many epochs and sparks.
        #[test]
        fn prop_gauges_stay_bounded(epochs in 1usize..12, spark in -500.0f64..500.0, seed in any::<u64>()) {
            let mut config = HiveConfig::without_pacing();
            config.evolution.seed = Some(seed);
            let services = HiveServices::deterministic(&config).unwrap();
            let mut collective = Collective::genesis(&config, services).unwrap();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            for _ in 0..epochs {
                let target = collective.agents().next().map(|a| a.id).unwrap();
                collective.inject_spark(target, spark);
                runtime.block_on(collective.evolve()).unwrap();
            }

            prop_assert_eq!(collective.epoch(), epochs as u64);
            for agent in collective.agents() {
                prop_assert!((0.0..=100.0).contains(&agent.curiosity));
                prop_assert!((0.0..=1.0).contains(&agent.quantum_coherence));
            }
            prop_assert!((80.0..=100.0).contains(&collective.memory_integrity()));
        }
    }
}
