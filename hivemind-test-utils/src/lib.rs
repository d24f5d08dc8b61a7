//! HIVEMIND Test Utilities
//!
//! Shared test infrastructure for the HIVEMIND workspace:
//! - Proptest generators for roles, memory types and fragments
//! - Fixtures for configuration, services and collectives
//! - Mock capabilities that fail, stall or answer deterministically
//! - Assertions for HIVEMIND-specific invariants

pub use hivemind_agents::{Agent, Collective, HiveServices, HiveSnapshot};
pub use hivemind_capabilities::{
    ChatBackend, Decision, DecisionOracle, NegotiationRequest, Provenance, Transcript,
};
pub use hivemind_core::{
    AgentError, AgentId, AgentRole, AgentTier, CapabilityError, ConfigError, HiveConfig,
    HiveError, HiveResult, MemoryError, MemoryType, OrchestrationError, Timestamp,
};
pub use hivemind_memory::{MemoryBackend, MemoryFragment, MemoryQuery, MemoryStore};
pub use hivemind_orchestrator::{
    ConversationState, ConversationStatus, Orchestrator, TaskExecutor, WorkflowValues,
};

use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for HIVEMIND types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random AgentId.
    pub fn arb_agent_id() -> impl Strategy<Value = AgentId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate one of the canonical roles.
    pub fn arb_agent_role() -> impl Strategy<Value = AgentRole> {
        prop::sample::select(AgentRole::ALL.to_vec())
    }

    pub fn arb_agent_tier() -> impl Strategy<Value = AgentTier> {
        prop_oneof![
            Just(AgentTier::Raw),
            Just(AgentTier::ToolUser),
            Just(AgentTier::Orchestrator),
            Just(AgentTier::Sage),
        ]
    }

    /// Generate a non-consolidated memory type.
    pub fn arb_base_memory_type() -> impl Strategy<Value = MemoryType> {
        prop_oneof![
            Just(MemoryType::Experience),
            Just(MemoryType::Knowledge),
            Just(MemoryType::Conversation),
            Just(MemoryType::Decision),
        ]
    }

    /// Generate any memory type, including one level of consolidation.
    pub fn arb_memory_type() -> impl Strategy<Value = MemoryType> {
        prop_oneof![
            3 => arb_base_memory_type(),
            1 => arb_base_memory_type().prop_map(MemoryType::consolidated),
        ]
    }

    /// Importance values, including a few outside [0, 1] that must be clamped.
    pub fn arb_importance() -> impl Strategy<Value = f32> {
        prop_oneof![
            8 => 0.0f32..=1.0,
            1 => -2.0f32..0.0,
            1 => 1.0f32..3.0,
        ]
    }

    /// Generate a Timestamp within the last two years.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..730 * 24 * 3600)
            .prop_map(|secs_ago| Utc::now() - chrono::Duration::seconds(secs_ago))
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z_]{3,12}", 0..4)
    }

    /// Generate a fragment owned by `agent_id`.
    pub fn arb_fragment_for(agent_id: AgentId) -> impl Strategy<Value = MemoryFragment> {
        (
            arb_agent_role(),
            "[a-zA-Z ]{1,60}",
            arb_base_memory_type(),
            arb_importance(),
            arb_timestamp(),
            0u32..6,
            arb_tags(),
        )
            .prop_map(
                move |(role, content, memory_type, importance, timestamp, accesses, tags)| {
                    let mut fragment =
                        MemoryFragment::new(agent_id, role.as_str(), content, memory_type, 0.0)
                            .with_timestamp(timestamp)
                            .with_access_count(accesses)
                            .with_tags(tags);
                    fragment.importance = importance;
                    fragment
                },
            )
    }

    /// Generate a fragment with a random owner.
    pub fn arb_fragment() -> impl Strategy<Value = MemoryFragment> {
        arb_agent_id().prop_flat_map(arb_fragment_for)
    }

    /// Non-empty list of distinct decision options.
    pub fn arb_options() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set("[a-z_]{3,16}", 1..6)
            .prop_map(|set| set.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Default configuration with pacing disabled and a fixed seed.
    pub fn test_config() -> HiveConfig {
        let mut config = HiveConfig::without_pacing();
        config.evolution.seed = Some(42);
        config
    }

    /// Services with no rich capabilities.
    pub fn deterministic_services(config: &HiveConfig) -> HiveServices {
        match HiveServices::deterministic(config) {
            Ok(services) => services,
            Err(err) => panic!("deterministic services failed to build: {err}"),
        }
    }

    /// Collective with the canonical roster over deterministic services.
    pub fn genesis_collective() -> Collective {
        let config = test_config();
        let services = deterministic_services(&config);
        match Collective::genesis(&config, services) {
            Ok(collective) => collective,
            Err(err) => panic!("genesis failed: {err}"),
        }
    }

    /// Keyword-only store with default thresholds.
    pub fn keyword_store() -> MemoryStore {
        MemoryStore::keyword_only(test_config().memory)
    }

    /// Fresh experience fragment.
    pub fn experience(agent_id: AgentId, content: &str, importance: f32) -> MemoryFragment {
        MemoryFragment::new(agent_id, "Engineer", content, MemoryType::Experience, importance)
    }

    /// Fragment created `days` ago and never accessed.
    pub fn aged_fragment(
        agent_id: AgentId,
        content: &str,
        memory_type: MemoryType,
        importance: f32,
        days: i64,
    ) -> MemoryFragment {
        MemoryFragment::new(agent_id, "Engineer", content, memory_type, importance)
            .with_timestamp(Utc::now() - chrono::Duration::days(days))
    }

    /// `count` old, unimportant, unread fragments of one type for one agent.
    pub fn consolidation_group(
        agent_id: AgentId,
        memory_type: MemoryType,
        count: usize,
    ) -> Vec<MemoryFragment> {
        (0..count)
            .map(|i| {
                aged_fragment(
                    agent_id,
                    &format!("routine observation {i}"),
                    memory_type.clone(),
                    0.1,
                    45,
                )
            })
            .collect()
    }

    /// Initiating context for a solar design review.
    pub fn solar_context() -> HashMap<String, Value> {
        HashMap::from([
            ("site".to_string(), json!("Test Site")),
            ("capacity_kw".to_string(), json!(9.6)),
            ("location".to_string(), json!("Sydney")),
        ])
    }
}

// ============================================================================
// MOCK CAPABILITIES
// ============================================================================

pub mod mocks {
    //! Capabilities that misbehave on purpose.

    use super::*;
    use hivemind_core::FragmentId;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Oracle that always errors.
    #[derive(Debug, Default)]
    pub struct FailingOracle;

    #[async_trait]
    impl DecisionOracle for FailingOracle {
        fn name(&self) -> &str {
            "failing_oracle"
        }

        async fn choose(&self, _options: &[String]) -> HiveResult<Decision> {
            Err(CapabilityError::Failed {
                capability: "failing_oracle".to_string(),
                reason: "circuit backend offline".to_string(),
            }
            .into())
        }
    }

    /// Oracle that answers with a fixed index and coherence, tagged as an
    /// oracle decision.
    #[derive(Debug, Clone)]
    pub struct FixedOracle {
        pub index: usize,
        pub coherence: f64,
    }

    impl FixedOracle {
        pub fn new(index: usize, coherence: f64) -> Self {
            Self { index, coherence }
        }
    }

    #[async_trait]
    impl DecisionOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed_oracle"
        }

        async fn choose(&self, options: &[String]) -> HiveResult<Decision> {
            let Some(selected) = options.get(self.index % options.len().max(1)) else {
                return Err(CapabilityError::InvalidRequest {
                    capability: "fixed_oracle".to_string(),
                    reason: "no options to choose from".to_string(),
                }
                .into());
            };
            Ok(Decision {
                selected: selected.clone(),
                index: self.index % options.len(),
                coherence: self.coherence,
                provenance: Provenance::Oracle,
            })
        }
    }

    /// Oracle that sleeps before answering like [`FixedOracle`].
    #[derive(Debug, Clone)]
    pub struct SlowOracle {
        pub delay: Duration,
    }

    impl SlowOracle {
        pub fn new(delay: Duration) -> Self {
            Self { delay }
        }
    }

    #[async_trait]
    impl DecisionOracle for SlowOracle {
        fn name(&self) -> &str {
            "slow_oracle"
        }

        async fn choose(&self, options: &[String]) -> HiveResult<Decision> {
            tokio::time::sleep(self.delay).await;
            FixedOracle::new(0, 1.0).choose(options).await
        }
    }

    /// Memory backend whose every call fails as unavailable.
    #[derive(Debug, Default)]
    pub struct UnreachableBackend;

    fn unavailable<T>() -> HiveResult<T> {
        Err(MemoryError::BackendUnavailable {
            backend: "unreachable".to_string(),
            reason: "connection refused".to_string(),
        }
        .into())
    }

    #[async_trait]
    impl MemoryBackend for UnreachableBackend {
        fn label(&self) -> &str {
            "unreachable"
        }

        async fn upsert(&self, _fragment: MemoryFragment) -> HiveResult<()> {
            unavailable()
        }

        async fn search(&self, _query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
            unavailable()
        }

        async fn get(&self, _id: &str) -> HiveResult<Option<MemoryFragment>> {
            unavailable()
        }

        async fn delete(&self, _id: &str) -> HiveResult<bool> {
            unavailable()
        }

        async fn scan(&self, _agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
            unavailable()
        }

        async fn touch(&self, _ids: &[FragmentId], _at: Timestamp) -> HiveResult<()> {
            unavailable()
        }

        async fn count(&self) -> HiveResult<usize> {
            unavailable()
        }
    }

    /// Task executor that always fails.
    #[derive(Debug, Clone)]
    pub struct FailingExecutor {
        pub capability: String,
    }

    impl FailingExecutor {
        pub fn new(capability: impl Into<String>) -> Self {
            Self {
                capability: capability.into(),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(
            &self,
            _inputs: &WorkflowValues,
            _context: &HashMap<String, Value>,
        ) -> HiveResult<WorkflowValues> {
            Err(CapabilityError::Failed {
                capability: self.capability.clone(),
                reason: "model run aborted".to_string(),
            }
            .into())
        }
    }

    /// Chat backend that refuses every negotiation.
    #[derive(Debug, Default)]
    pub struct FailingChat;

    #[async_trait]
    impl ChatBackend for FailingChat {
        fn name(&self) -> &str {
            "failing_chat"
        }

        async fn negotiate(&self, _request: &NegotiationRequest) -> HiveResult<Transcript> {
            Err(CapabilityError::Unavailable {
                capability: "failing_chat".to_string(),
                reason: "connection refused".to_string(),
            }
            .into())
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for HIVEMIND-specific validation.

    use super::*;

    /// Assert that a HiveResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &HiveResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a HiveResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &HiveResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a HiveResult is an UnknownPattern error for `name`.
    #[track_caller]
    pub fn assert_unknown_pattern<T: std::fmt::Debug>(result: &HiveResult<T>, name: &str) {
        match result {
            Err(HiveError::Orchestration(OrchestrationError::UnknownPattern { name: n })) => {
                assert_eq!(n, name, "Wrong pattern name in UnknownPattern error");
            }
            other => panic!("Expected UnknownPattern({}), got: {:?}", name, other),
        }
    }

    /// Assert that a HiveResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &HiveResult<T>) {
        match result {
            Err(HiveError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a HiveResult is an Agent error.
    #[track_caller]
    pub fn assert_agent_error<T: std::fmt::Debug>(result: &HiveResult<T>) {
        match result {
            Err(HiveError::Agent(_)) => {}
            other => panic!("Expected Agent error, got: {:?}", other),
        }
    }

    /// Assert that an agent's gauges are in range.
    #[track_caller]
    pub fn assert_agent_bounded(agent: &Agent) {
        assert!(
            (0.0..=100.0).contains(&agent.curiosity),
            "curiosity out of range for {}: {}",
            agent.id,
            agent.curiosity
        );
        assert!(
            (0.0..=1.0).contains(&agent.quantum_coherence),
            "coherence out of range for {}: {}",
            agent.id,
            agent.quantum_coherence
        );
    }

    /// Assert that a snapshot is internally consistent.
    #[track_caller]
    pub fn assert_snapshot_consistent(snapshot: &HiveSnapshot) {
        assert_eq!(snapshot.schema_version, hivemind_agents::SNAPSHOT_SCHEMA_VERSION);
        assert!(
            (80.0..=100.0).contains(&snapshot.memory_integrity),
            "integrity out of range: {}",
            snapshot.memory_integrity
        );
        assert!(snapshot.uptime_seconds >= 0.0);
        assert!(snapshot.active_agents.iter().all(|a| a.active));
        for agent in &snapshot.active_agents {
            assert_agent_bounded(agent);
        }
    }

    /// Assert that a conversation completed after walking `steps` steps.
    #[track_caller]
    pub fn assert_completed(status: &ConversationStatus, steps: usize) {
        assert_eq!(
            status.state,
            ConversationState::Completed,
            "conversation {} ended in {} ({:?})",
            status.conversation_id,
            status.state,
            status.error
        );
        assert_eq!(status.workflow_step, steps);
    }

    /// Assert that a fragment's importance is inside [0, 1].
    #[track_caller]
    pub fn assert_importance_normalized(fragment: &MemoryFragment) {
        assert!(
            (0.0..=1.0).contains(&fragment.importance),
            "importance out of range for {}: {}",
            fragment.id,
            fragment.importance
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_test_config_is_valid() {
        let config = fixtures::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.step_delay_ms, 0);
        assert_eq!(config.evolution.pair_delay_ms, 0);
    }

    #[test]
    fn test_genesis_fixture() {
        let collective = fixtures::genesis_collective();
        assert_eq!(collective.agents().count(), 8);
        collective.agents().for_each(assertions::assert_agent_bounded);
        assertions::assert_snapshot_consistent(&collective.snapshot());
    }

    #[test]
    fn test_consolidation_group_fixture() {
        let agent = hivemind_core::new_agent_id();
        let group = fixtures::consolidation_group(agent, MemoryType::Knowledge, 4);
        assert_eq!(group.len(), 4);
        assert!(group.iter().all(|f| f.agent_id == agent && f.access_count == 0));
        assert!(group.iter().all(|f| (Utc::now() - f.timestamp).num_days() >= 45));
    }

    #[tokio::test]
    async fn test_fixed_oracle() {
        let options = vec!["a".to_string(), "b".to_string()];
        let decision = FixedOracle::new(3, 0.9).choose(&options).await.unwrap();
        assert_eq!(decision.selected, "b");
        assert_eq!(decision.provenance, Provenance::Oracle);
        assert!(FixedOracle::new(0, 1.0).choose(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_oracle() {
        let result = FailingOracle.choose(&["x".to_string()]).await;
        assertions::assert_err(&result);
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_store() {
        let backend: Arc<dyn MemoryBackend> = Arc::new(UnreachableBackend);
        let store = MemoryStore::new(fixtures::test_config().memory, Some(backend));
        let id = hivemind_core::new_agent_id();
        assert!(store.store(fixtures::experience(id, "kept anyway", 0.5)).await.unwrap());
        assert!(store.is_degraded());
        assert_eq!(store.backend_label(), "keyword (degraded)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_oracle_waits() {
        let started = tokio::time::Instant::now();
        let decision = SlowOracle::new(Duration::from_secs(2))
            .choose(&["only".to_string()])
            .await
            .unwrap();
        assert_eq!(decision.selected, "only");
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_generated_options_are_distinct(options in arb_options()) {
            let mut sorted = options.clone();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), options.len());
            prop_assert!(!options.is_empty());
        }

        #[test]
        fn prop_normalized_fragments_are_in_range(fragment in arb_fragment()) {
            assertions::assert_importance_normalized(&fragment.normalized());
        }
    }
}
