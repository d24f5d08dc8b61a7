//! The collaboration orchestrator service

use crate::conversation::{
    Conversation, ConversationId, ConversationMetadata, ConversationState, ConversationStatus,
    MessageId, MessageKind, Recipient, WorkflowValues,
};
use crate::executors::{base_result, ExecutorRegistry};
use crate::patterns::{CollaborationPattern, PatternCatalog};
use chrono::Utc;
use hivemind_capabilities::{
    speaker_label, ChatBackend, NegotiationRequest, ParticipantDescriptor, TranscriptKind,
};
use hivemind_core::{
    duration_millis, AgentId, AgentRole, HiveError, HiveResult, MemoryType, OrchestrationError,
    OrchestratorConfig, Timestamp,
};
use hivemind_memory::{MemoryStore, SYSTEM_AGENT_ID};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Role label used for fragments the orchestrator writes.
const ORCHESTRATOR_ROLE: &str = "Orchestrator";

/// Importance of conversation summary fragments.
const CONVERSATION_IMPORTANCE: f32 = 0.5;

/// An agent known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub agent_id: AgentId,
    pub role: AgentRole,
    /// System briefing handed to chat backends
    pub briefing: String,
    pub tools: Vec<String>,
    pub registered_at: Timestamp,
}

/// Orchestrator-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Chat backend name, or `fallback`
    pub backend: String,
    pub total_agents: usize,
    pub total_conversations: usize,
    /// InProgress or AwaitingResponse
    pub active_conversations: usize,
    pub completed_conversations: usize,
    pub collaboration_patterns: usize,
    pub available_patterns: Vec<String>,
}

enum RichOutcome {
    /// The conversation reached a terminal state on the rich path
    Finished,
    /// The backend failed or timed out; the conversation is back in progress
    BackendFailed,
}

fn poisoned<T>(_: T) -> HiveError {
    HiveError::Orchestration(OrchestrationError::LockPoisoned)
}

/// Evict the least recently updated terminal conversations until at most
/// `limit` remain. Unfinished conversations are never evicted.
fn evict_finished(conversations: &mut HashMap<ConversationId, Conversation>, limit: usize) {
    let excess = conversations.len().saturating_sub(limit);
    if excess == 0 {
        return;
    }
    let mut finished: Vec<(Timestamp, ConversationId)> = conversations
        .values()
        .filter(|c| c.state.is_terminal())
        .map(|c| (c.updated_at, c.id.clone()))
        .collect();
    finished.sort();
    for (_, id) in finished.into_iter().take(excess) {
        conversations.remove(&id);
    }
}

fn message_kind(kind: TranscriptKind) -> MessageKind {
    match kind {
        TranscriptKind::Announcement => MessageKind::TaskAnnouncement,
        TranscriptKind::Contribution => MessageKind::Response,
        TranscriptKind::Completion => MessageKind::TaskCompletion,
        TranscriptKind::Acknowledgment => MessageKind::Acknowledgment,
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Runs collaboration patterns as conversations.
///
/// Shared behind an `Arc`; internal maps sit behind short-lived locks that are
/// never held across an `.await`.
pub struct Orchestrator {
    config: OrchestratorConfig,
    catalog: PatternCatalog,
    executors: ExecutorRegistry,
    chat: Option<Arc<dyn ChatBackend>>,
    memory: Option<Arc<MemoryStore>>,
    agents: RwLock<HashMap<AgentId, RegisteredAgent>>,
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl Orchestrator {
    /// Orchestrator with the built-in catalog and executors, no chat backend
    /// and no memory store.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            catalog: PatternCatalog::builtin(),
            executors: ExecutorRegistry::builtin(),
            chat: None,
            memory: None,
            agents: RwLock::new(HashMap::new()),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Like [`new`](Self::new), extending the catalog from
    /// `config.pattern_catalog` when set.
    pub fn from_config(config: OrchestratorConfig) -> HiveResult<Self> {
        let mut catalog = PatternCatalog::builtin();
        if let Some(path) = &config.pattern_catalog {
            let added = catalog.extend_from_file(path)?;
            info!(path = %path.display(), added, "Loaded pattern catalog");
        }
        Ok(Self::new(config).with_catalog(catalog))
    }

    pub fn with_catalog(mut self, catalog: PatternCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatBackend>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Chat backend name, or `fallback` when none is configured.
    pub fn backend_label(&self) -> String {
        self.chat
            .as_ref()
            .map(|chat| chat.name().to_string())
            .unwrap_or_else(|| "fallback".to_string())
    }

    // ------------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------------

    /// Register an agent, replacing any previous entry with the same id.
    pub fn register_agent(
        &self,
        agent_id: AgentId,
        role: AgentRole,
        briefing: impl Into<String>,
        tools: Vec<String>,
    ) -> HiveResult<bool> {
        let entry = RegisteredAgent {
            agent_id,
            role,
            briefing: briefing.into(),
            tools,
            registered_at: Utc::now(),
        };
        self.agents.write().map_err(poisoned)?.insert(agent_id, entry);
        info!(agent_id = %agent_id, role = %role, "Registered agent");
        Ok(true)
    }

    pub fn agent(&self, agent_id: AgentId) -> HiveResult<Option<RegisteredAgent>> {
        Ok(self.agents.read().map_err(poisoned)?.get(&agent_id).cloned())
    }

    pub fn agent_count(&self) -> HiveResult<usize> {
        Ok(self.agents.read().map_err(poisoned)?.len())
    }

    /// One registered agent per pattern role that has one. Ties go to the lowest id.
    fn participants_for(
        &self,
        pattern: &CollaborationPattern,
    ) -> HiveResult<Vec<ParticipantDescriptor>> {
        let agents = self.agents.read().map_err(poisoned)?;
        let mut participants = Vec::new();
        for role in &pattern.participants {
            let chosen = agents
                .values()
                .filter(|agent| agent.role == *role)
                .min_by_key(|agent| agent.agent_id);
            if let Some(agent) = chosen {
                participants.push(ParticipantDescriptor {
                    agent_id: agent.agent_id,
                    role: agent.role,
                    briefing: agent.briefing.clone(),
                    tools: agent.tools.clone(),
                });
            }
        }
        Ok(participants)
    }

    // ------------------------------------------------------------------------
    // Collaboration
    // ------------------------------------------------------------------------

    /// Run `pattern_name` as a new conversation and return its id.
    ///
    /// Unknown patterns fail with `UnknownPattern` and create nothing. Once a
    /// conversation exists its id is returned even when the run ends in the
    /// Error state; the failure is recorded on the conversation.
    pub async fn initiate(
        &self,
        pattern_name: &str,
        context: HashMap<String, Value>,
    ) -> HiveResult<ConversationId> {
        let Some(pattern) = self.catalog.get(pattern_name).cloned() else {
            error!(pattern = pattern_name, "Unknown collaboration pattern");
            return Err(OrchestrationError::UnknownPattern {
                name: pattern_name.to_string(),
            }
            .into());
        };

        let id = ConversationId::generate();
        let metadata = ConversationMetadata {
            pattern: Some(pattern.name.clone()),
            context: context.clone(),
            ..Default::default()
        };
        let conversation = Conversation::new(
            id.clone(),
            pattern.participants.iter().map(|r| r.to_string()).collect(),
            pattern.description.clone(),
            metadata,
        );
        self.conversations
            .write()
            .map_err(poisoned)?
            .insert(id.clone(), conversation);

        if let Err(err) = self.execute(&id, &pattern, &context).await {
            if matches!(err, HiveError::Orchestration(OrchestrationError::LockPoisoned)) {
                return Err(err);
            }
            error!(conversation_id = %id, pattern = %pattern.name, error = %err, "Collaboration failed");
            self.fail(&id, &err)?;
        }

        let status = self.with_conversation(&id, |conv| Ok(conv.status()))?;
        if status.state == ConversationState::Completed {
            info!(
                conversation_id = %id,
                pattern = %pattern.name,
                steps = status.workflow_step,
                messages = status.message_count,
                "Collaboration completed"
            );
            self.remember(&pattern, &status).await;
        }
        let mut conversations = self.conversations.write().map_err(poisoned)?;
        evict_finished(&mut conversations, self.config.max_retained_conversations);
        Ok(id)
    }

    async fn execute(
        &self,
        id: &ConversationId,
        pattern: &CollaborationPattern,
        context: &HashMap<String, Value>,
    ) -> HiveResult<()> {
        if let Some(chat) = &self.chat {
            match self.run_rich(chat.as_ref(), id, pattern, context).await? {
                RichOutcome::Finished => return Ok(()),
                RichOutcome::BackendFailed => {}
            }
        }
        self.run_fallback(id, pattern, context).await
    }

    async fn run_rich(
        &self,
        chat: &dyn ChatBackend,
        id: &ConversationId,
        pattern: &CollaborationPattern,
        context: &HashMap<String, Value>,
    ) -> HiveResult<RichOutcome> {
        let participants = self.participants_for(pattern)?;
        if participants.len() < self.config.min_participants {
            return Err(OrchestrationError::InsufficientParticipants {
                pattern: pattern.name.clone(),
                required: self.config.min_participants,
                found: participants.len(),
            }
            .into());
        }

        self.transition(id, ConversationState::InProgress)?;
        self.transition(id, ConversationState::AwaitingResponse)?;

        let request = NegotiationRequest {
            conversation_id: id.to_string(),
            pattern: pattern.name.clone(),
            description: pattern.description.clone(),
            participants,
            steps: pattern.workflow.iter().map(|s| s.to_descriptor()).collect(),
            context: context.clone(),
            max_rounds: self.config.max_rounds,
        };

        let deadline = self.config.backend_timeout();
        let transcript = match tokio::time::timeout(deadline, chat.negotiate(&request)).await {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(err)) => {
                warn!(
                    conversation_id = %id,
                    backend = chat.name(),
                    error = %err,
                    "Chat backend failed, running fallback executor"
                );
                return self.resume_after_backend(id);
            }
            Err(_) => {
                warn!(
                    conversation_id = %id,
                    backend = chat.name(),
                    timeout_ms = duration_millis(deadline),
                    "Chat backend timed out, running fallback executor"
                );
                return self.resume_after_backend(id);
            }
        };

        let step_count = pattern.step_count();
        let rounds = transcript.rounds;
        self.with_conversation(id, |conv| {
            if conv.state.is_terminal() {
                return Ok(());
            }
            for message in transcript.messages {
                conv.push_message(
                    message.sender,
                    Recipient::from_address(&message.recipient),
                    message.content,
                    message_kind(message.kind),
                    message.metadata,
                );
            }
            conv.advance_step(step_count);
            conv.metadata.final_outputs = Some(conv.metadata.workflow_outputs.clone());
            conv.transition(ConversationState::Completed)?;
            Ok(())
        })?;
        debug!(conversation_id = %id, rounds, "Negotiation finished");
        Ok(RichOutcome::Finished)
    }

    fn resume_after_backend(&self, id: &ConversationId) -> HiveResult<RichOutcome> {
        self.with_conversation(id, |conv| {
            if conv.state.is_terminal() {
                return Ok(RichOutcome::Finished);
            }
            conv.transition(ConversationState::InProgress)?;
            Ok(RichOutcome::BackendFailed)
        })
    }

    /// Deterministic in-order workflow runner.
    async fn run_fallback(
        &self,
        id: &ConversationId,
        pattern: &CollaborationPattern,
        context: &HashMap<String, Value>,
    ) -> HiveResult<()> {
        let started = self.with_conversation(id, |conv| {
            if conv.state.is_terminal() {
                return Ok(false);
            }
            if conv.state == ConversationState::Initiated {
                conv.transition(ConversationState::InProgress)?;
            }
            Ok(true)
        })?;
        if !started {
            return Ok(());
        }

        let mut outputs = WorkflowValues::new();
        for (index, step) in pattern.workflow.iter().enumerate() {
            if index > 0 {
                let delay = self.config.step_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let number = index + 1;
            let live = self.with_conversation(id, |conv| {
                if conv.state.is_terminal() {
                    return Ok(false);
                }
                conv.advance_step(number);
                Ok(true)
            })?;
            if !live {
                debug!(conversation_id = %id, step = number, "Conversation closed mid-workflow");
                return Ok(());
            }

            let inputs: WorkflowValues = step
                .inputs
                .iter()
                .filter_map(|name| {
                    outputs
                        .get(name)
                        .or_else(|| context.get(name))
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect();

            let mut result = base_result(step.role, &step.task);
            if let Some(executor) = self.executors.get(step.role, &step.task) {
                let produced = executor.execute(&inputs, context).await.map_err(|e| {
                    OrchestrationError::StepExecutionFault {
                        step: number,
                        role: step.role.to_string(),
                        task: step.task.clone(),
                        reason: e.to_string(),
                    }
                })?;
                result.extend(produced);
            }

            let step_outputs: WorkflowValues = step
                .outputs
                .iter()
                .map(|name| {
                    let value = result
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| json!(format!("Result from {}", step.task)));
                    (name.clone(), value)
                })
                .collect();
            outputs.extend(step_outputs.clone());

            let content = format!(
                "Completed {}: {}",
                step.task,
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
            let metadata = serde_json::to_value(step).unwrap_or(Value::Null);
            self.with_conversation(id, |conv| {
                conv.metadata.workflow_outputs.extend(step_outputs);
                conv.push_message(
                    speaker_label(step.role),
                    Recipient::Workflow,
                    content,
                    MessageKind::TaskCompletion,
                    metadata,
                );
                Ok(())
            })?;
            debug!(conversation_id = %id, step = number, task = %step.task, "Workflow step completed");
        }

        self.with_conversation(id, |conv| {
            if conv.state.is_terminal() {
                return Ok(());
            }
            conv.metadata.final_outputs = Some(outputs);
            conv.transition(ConversationState::Completed)?;
            Ok(())
        })
    }

    fn fail(&self, id: &ConversationId, err: &HiveError) -> HiveResult<()> {
        self.with_conversation(id, |conv| {
            if conv.state.is_terminal() {
                return Ok(());
            }
            conv.metadata.error = Some(err.to_string());
            conv.transition(ConversationState::Error)?;
            Ok(())
        })
    }

    async fn remember(&self, pattern: &CollaborationPattern, status: &ConversationStatus) {
        let Some(memory) = &self.memory else {
            return;
        };
        let outputs: Vec<&str> = status.final_outputs.keys().map(String::as_str).collect();
        let content = format!(
            "Collaboration {} completed in {} steps ({} messages). Outputs: {}",
            pattern.name,
            status.workflow_step,
            status.message_count,
            if outputs.is_empty() {
                "none".to_string()
            } else {
                outputs.join(", ")
            }
        );
        let tags = vec![pattern.name.clone(), "collaboration".to_string()];
        if let Err(err) = memory
            .store_experience(
                SYSTEM_AGENT_ID,
                ORCHESTRATOR_ROLE,
                content,
                MemoryType::Conversation,
                CONVERSATION_IMPORTANCE,
                tags,
            )
            .await
        {
            warn!(conversation_id = %status.conversation_id, error = %err, "Failed to record conversation memory");
        }
    }

    // ------------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------------

    fn with_conversation<R>(
        &self,
        id: &ConversationId,
        f: impl FnOnce(&mut Conversation) -> HiveResult<R>,
    ) -> HiveResult<R> {
        let mut conversations = self.conversations.write().map_err(poisoned)?;
        let conversation =
            conversations
                .get_mut(id)
                .ok_or_else(|| OrchestrationError::ConversationNotFound {
                    id: id.to_string(),
                })?;
        f(conversation)
    }

    fn transition(&self, id: &ConversationId, next: ConversationState) -> HiveResult<()> {
        self.with_conversation(id, |conv| {
            conv.transition(next).map_err(|err| {
                warn!(error = %err, "Rejected conversation transition");
                HiveError::from(err)
            })
        })
    }

    pub fn status(&self, id: &ConversationId) -> HiveResult<Option<ConversationStatus>> {
        let conversations = self.conversations.read().map_err(poisoned)?;
        Ok(conversations.get(id).map(Conversation::status))
    }

    pub fn conversation(&self, id: &ConversationId) -> HiveResult<Option<Conversation>> {
        let conversations = self.conversations.read().map_err(poisoned)?;
        Ok(conversations.get(id).cloned())
    }

    /// Most recently updated conversations first.
    pub fn recent(&self, limit: usize) -> HiveResult<Vec<ConversationStatus>> {
        let conversations = self.conversations.read().map_err(poisoned)?;
        let mut statuses: Vec<ConversationStatus> =
            conversations.values().map(Conversation::status).collect();
        statuses.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.conversation_id.cmp(&a.conversation_id))
        });
        statuses.truncate(limit);
        Ok(statuses)
    }

    /// Append a message to the direct conversation between `sender` and
    /// `receiver` for the current time bucket, creating it when needed.
    pub fn send_direct(
        &self,
        sender: &str,
        receiver: &str,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> HiveResult<MessageId> {
        let width = self.config.direct_bucket_secs.max(1) as i64;
        let bucket = Utc::now().timestamp().div_euclid(width);
        let id = ConversationId::direct(sender, receiver, bucket);

        let mut conversations = self.conversations.write().map_err(poisoned)?;
        if !conversations.contains_key(&id) {
            let metadata = ConversationMetadata {
                direct: true,
                ..Default::default()
            };
            let mut conversation = Conversation::new(
                id.clone(),
                vec![sender.to_string(), receiver.to_string()],
                "Direct conversation",
                metadata,
            );
            conversation.transition(ConversationState::InProgress)?;
            conversations.insert(id.clone(), conversation);
            evict_finished(&mut conversations, self.config.max_retained_conversations);
        }

        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| OrchestrationError::ConversationNotFound { id: id.to_string() })?;
        if conversation.state.is_terminal() {
            return Err(OrchestrationError::InvalidTransition {
                id: id.to_string(),
                from: conversation.state.to_string(),
                to: ConversationState::InProgress.to_string(),
            }
            .into());
        }
        let message_id = conversation.push_message(
            sender,
            Recipient::Agent(receiver.to_string()),
            content,
            kind,
            json!({ "direct_message": true }),
        );
        drop(conversations);

        info!(sender, receiver, conversation_id = %id, "Direct message sent");
        Ok(message_id)
    }

    /// Move a non-terminal conversation to Terminated.
    pub fn terminate(&self, id: &ConversationId, reason: impl Into<String>) -> HiveResult<()> {
        let reason = reason.into();
        self.with_conversation(id, |conv| {
            conv.transition(ConversationState::Terminated)?;
            conv.metadata.termination_reason = Some(reason.clone());
            Ok(())
        })?;
        info!(conversation_id = %id, reason = %reason, "Conversation terminated");
        Ok(())
    }

    pub fn stats(&self) -> HiveResult<OrchestratorStats> {
        let total_agents = self.agent_count()?;
        let conversations = self.conversations.read().map_err(poisoned)?;
        Ok(OrchestratorStats {
            backend: self.backend_label(),
            total_agents,
            total_conversations: conversations.len(),
            active_conversations: conversations.values().filter(|c| c.state.is_active()).count(),
            completed_conversations: conversations
                .values()
                .filter(|c| c.state == ConversationState::Completed)
                .count(),
            collaboration_patterns: self.catalog.len(),
            available_patterns: self.catalog.names(),
        })
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend_label())
            .field("patterns", &self.catalog.names())
            .field("executors", &self.executors)
            .field("has_memory", &self.memory.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::executors::TaskExecutor;
    use async_trait::async_trait;
    use hivemind_core::CapabilityError;
    use proptest::prelude::*;

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(
            &self,
            _inputs: &WorkflowValues,
            _context: &HashMap<String, Value>,
        ) -> HiveResult<WorkflowValues> {
            Err(CapabilityError::Failed {
                capability: "executor".to_string(),
                reason: "injected".to_string(),
            }
            .into())
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// workflow_step never exceeds the step count, equals it on completion,
        /// and completion messages follow the declared step order.
        #[test]
        fn prop_workflow_step_bounded(pattern_index in 0usize..3, fail_at in proptest::option::of(0usize..4)) {
            let catalog = PatternCatalog::builtin();
            let names = catalog.names();
            let pattern = catalog.get(&names[pattern_index]).unwrap().clone();

            let mut executors = ExecutorRegistry::builtin();
            let failing_step = fail_at.filter(|i| *i < pattern.step_count());
            if let Some(i) = failing_step {
                let step = &pattern.workflow[i];
                executors.register(step.role, step.task.clone(), Arc::new(FailingExecutor));
            }
            let orchestrator = Orchestrator::new(OrchestratorConfig {
                step_delay_ms: 0,
                ..Default::default()
            })
            .with_executors(executors);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let id = runtime
                .block_on(orchestrator.initiate(&pattern.name, HashMap::new()))
                .unwrap();
            let conv = orchestrator.conversation(&id).unwrap().unwrap();

            prop_assert!(conv.metadata.workflow_step <= pattern.step_count());
            for (message, step) in conv.messages.iter().zip(pattern.workflow.iter()) {
                prop_assert_eq!(&message.metadata, &serde_json::to_value(step).unwrap());
            }
            match failing_step {
                None => {
                    prop_assert_eq!(conv.state, ConversationState::Completed);
                    prop_assert_eq!(conv.metadata.workflow_step, pattern.step_count());
                    prop_assert_eq!(conv.messages.len(), pattern.step_count());
                }
                Some(i) => {
                    prop_assert_eq!(conv.state, ConversationState::Error);
                    prop_assert_eq!(conv.metadata.workflow_step, i + 1);
                    prop_assert_eq!(conv.messages.len(), i);
                }
            }
        }
    }
}
