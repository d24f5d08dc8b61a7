//! Chat/workflow backends
//!
//! A chat backend runs a multi-party negotiation for one collaboration and
//! returns the transcript. The orchestrator owns conversation state; the
//! backend only produces messages.

use async_trait::async_trait;
use hivemind_core::{AgentId, AgentRole, CapabilityError, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// REQUEST / TRANSCRIPT TYPES
// ============================================================================

/// A registered agent taking part in a negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    /// Agent identifier
    pub agent_id: AgentId,
    /// Role the agent plays
    pub role: AgentRole,
    /// Free-text system briefing
    pub briefing: String,
    /// Tools the agent may use
    pub tools: Vec<String>,
}

/// One workflow step as seen by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub role: AgentRole,
    pub task: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Everything a backend needs to run one collaboration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    /// Conversation the transcript belongs to
    pub conversation_id: String,
    /// Pattern name
    pub pattern: String,
    /// Pattern description, used as the opening brief
    pub description: String,
    /// Participants, one per role that has a registered agent
    pub participants: Vec<ParticipantDescriptor>,
    /// Ordered workflow steps
    pub steps: Vec<StepDescriptor>,
    /// Initiating context
    pub context: HashMap<String, serde_json::Value>,
    /// Maximum number of rounds the backend may run
    pub max_rounds: usize,
}

/// Kind of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptKind {
    Announcement,
    Contribution,
    Completion,
    Acknowledgment,
}

/// One message produced by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Speaker label, e.g. `agent_Engineer`
    pub sender: String,
    /// `group` or a speaker label
    pub recipient: String,
    pub content: String,
    pub kind: TranscriptKind,
    pub metadata: serde_json::Value,
}

/// Full result of a negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<TranscriptMessage>,
    /// Rounds actually used
    pub rounds: usize,
}

/// Trait for chat/workflow backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend label reported in orchestrator statistics.
    fn name(&self) -> &str;

    /// Run the negotiation to completion.
    async fn negotiate(&self, request: &NegotiationRequest) -> HiveResult<Transcript>;
}

// ============================================================================
// SCRIPTED GROUP CHAT
// ============================================================================

/// Deterministic group chat that walks the workflow steps.
///
/// Per step the owning role announces the task, reports completion, and the
/// other participants acknowledge until the transcript holds
/// `message_limit` messages. One step is one round.
#[derive(Debug, Clone)]
pub struct ScriptedGroupChat {
    /// Acknowledgments stop once the transcript reaches this size
    message_limit: usize,
    /// Pacing between rounds
    round_delay: Duration,
}

impl ScriptedGroupChat {
    pub const DEFAULT_MESSAGE_LIMIT: usize = 15;

    pub fn new(round_delay: Duration) -> Self {
        Self {
            message_limit: Self::DEFAULT_MESSAGE_LIMIT,
            round_delay,
        }
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }
}

impl Default for ScriptedGroupChat {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

pub fn speaker_label(role: AgentRole) -> String {
    format!("agent_{}", role)
}

#[async_trait]
impl ChatBackend for ScriptedGroupChat {
    fn name(&self) -> &str {
        "scripted_group_chat"
    }

    async fn negotiate(&self, request: &NegotiationRequest) -> HiveResult<Transcript> {
        if request.participants.is_empty() {
            return Err(HiveError::Capability(CapabilityError::InvalidRequest {
                capability: self.name().to_string(),
                reason: "negotiation has no participants".to_string(),
            }));
        }

        let mut transcript = Transcript::default();
        for step in request.steps.iter().take(request.max_rounds) {
            let speaker = speaker_label(step.role);
            let step_json = serde_json::to_value(step).map_err(|e| {
                HiveError::Capability(CapabilityError::Failed {
                    capability: self.name().to_string(),
                    reason: e.to_string(),
                })
            })?;

            transcript.messages.push(TranscriptMessage {
                sender: speaker.clone(),
                recipient: "group".to_string(),
                content: format!("Starting {} with inputs: {:?}", step.task, step.inputs),
                kind: TranscriptKind::Announcement,
                metadata: step_json.clone(),
            });
            transcript.messages.push(TranscriptMessage {
                sender: speaker.clone(),
                recipient: "group".to_string(),
                content: format!("Completed {}. Outputs: {:?}", step.task, step.outputs),
                kind: TranscriptKind::Completion,
                metadata: step_json,
            });

            for participant in &request.participants {
                if participant.role == step.role {
                    continue;
                }
                if transcript.messages.len() >= self.message_limit {
                    break;
                }
                transcript.messages.push(TranscriptMessage {
                    sender: speaker_label(participant.role),
                    recipient: speaker.clone(),
                    content: format!(
                        "Acknowledged completion of {}. Results look good from {} perspective.",
                        step.task, participant.role
                    ),
                    kind: TranscriptKind::Acknowledgment,
                    metadata: serde_json::json!({ "responding_to": step.task }),
                });
            }

            transcript.rounds += 1;
            if !self.round_delay.is_zero() {
                tokio::time::sleep(self.round_delay).await;
            }
        }

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_core::new_agent_id;

    fn participant(role: AgentRole) -> ParticipantDescriptor {
        ParticipantDescriptor {
            agent_id: new_agent_id(),
            role,
            briefing: String::new(),
            tools: vec![],
        }
    }

    fn step(role: AgentRole, task: &str) -> StepDescriptor {
        StepDescriptor {
            role,
            task: task.to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }

    fn request(steps: Vec<StepDescriptor>, max_rounds: usize) -> NegotiationRequest {
        NegotiationRequest {
            conversation_id: "c1".to_string(),
            pattern: "grid_integration_study".to_string(),
            description: "Analyze grid integration requirements and impacts".to_string(),
            participants: vec![
                participant(AgentRole::WeatherOracle),
                participant(AgentRole::Analyst),
                participant(AgentRole::Philosopher),
            ],
            steps,
            context: HashMap::new(),
            max_rounds,
        }
    }

    #[tokio::test]
    async fn test_scripted_chat_walks_steps() {
        let chat = ScriptedGroupChat::new(Duration::ZERO);
        let req = request(
            vec![
                step(AgentRole::WeatherOracle, "generation_forecast"),
                step(AgentRole::Analyst, "grid_impact_analysis"),
            ],
            20,
        );
        let transcript = chat.negotiate(&req).await.unwrap();
        assert_eq!(transcript.rounds, 2);
        // announce + complete + two acks per step
        assert_eq!(transcript.messages.len(), 8);
        assert_eq!(transcript.messages[0].kind, TranscriptKind::Announcement);
        assert_eq!(transcript.messages[0].sender, "agent_WeatherOracle");
        assert_eq!(transcript.messages[2].recipient, "agent_WeatherOracle");
    }

    #[tokio::test]
    async fn test_scripted_chat_limits_acknowledgments() {
        let chat = ScriptedGroupChat::new(Duration::ZERO).with_message_limit(3);
        let req = request(vec![step(AgentRole::Analyst, "grid_impact_analysis")], 20);
        let transcript = chat.negotiate(&req).await.unwrap();
        assert_eq!(transcript.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_chat_respects_max_rounds() {
        let chat = ScriptedGroupChat::new(Duration::ZERO);
        let req = request(
            vec![
                step(AgentRole::WeatherOracle, "a"),
                step(AgentRole::Analyst, "b"),
                step(AgentRole::Philosopher, "c"),
            ],
            1,
        );
        assert_eq!(chat.negotiate(&req).await.unwrap().rounds, 1);
    }

    #[tokio::test]
    async fn test_scripted_chat_requires_participants() {
        let chat = ScriptedGroupChat::default();
        let mut req = request(vec![], 20);
        req.participants.clear();
        assert!(chat.negotiate(&req).await.is_err());
    }
}
