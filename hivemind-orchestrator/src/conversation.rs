//! Conversations, messages and the conversation state machine.
//!
//! # State Transition Diagram
//!
//! ```text
//! Initiated ── start ──→ InProgress ──┬── complete ──→ Completed (terminal)
//!     │                    ↑   │      ├── terminate ─→ Terminated (terminal)
//!     │                    │   ↓      └── fail ──────→ Error (terminal)
//!     │               AwaitingResponse ── (complete | terminate | fail)
//!     └── terminate | fail
//! ```

use chrono::Utc;
use hivemind_core::{OrchestrationError, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a message.
pub type MessageId = Uuid;

/// Named values flowing between workflow steps.
pub type WorkflowValues = BTreeMap<String, Value>;

// ============================================================================
// CONVERSATION ID
// ============================================================================

/// Identifier of a conversation.
///
/// Workflow conversations use a UUIDv7 string; direct conversations use
/// `direct:<len>:<sender>:<len>:<receiver>:<bucket>`, where each name is
/// prefixed by its byte length so distinct pairs never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Fresh id for a workflow conversation.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Id of the direct conversation between two parties in a time bucket.
    pub fn direct(sender: &str, receiver: &str, bucket: i64) -> Self {
        Self(format!(
            "direct:{}:{}:{}:{}:{}",
            sender.len(),
            sender,
            receiver.len(),
            receiver,
            bucket
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// CONVERSATION STATE
// ============================================================================

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Created, no work started yet
    Initiated,
    /// Workflow steps are running
    InProgress,
    /// Waiting on a chat backend
    AwaitingResponse,
    /// All steps finished
    Completed,
    /// Stopped on request
    Terminated,
    /// Stopped by a failure
    Error,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Initiated => "initiated",
            ConversationState::InProgress => "in_progress",
            ConversationState::AwaitingResponse => "awaiting_response",
            ConversationState::Completed => "completed",
            ConversationState::Terminated => "terminated",
            ConversationState::Error => "error",
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationState::Completed | ConversationState::Terminated | ConversationState::Error
        )
    }

    /// Work is underway.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConversationState::InProgress | ConversationState::AwaitingResponse
        )
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(&self, next: ConversationState) -> bool {
        use ConversationState::*;
        match (self, next) {
            (Initiated, InProgress | Terminated | Error) => true,
            (InProgress, AwaitingResponse | Completed | Terminated | Error) => true,
            (AwaitingResponse, InProgress | Completed | Terminated | Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = ConversationStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initiated" => Ok(ConversationState::Initiated),
            "in_progress" | "inprogress" | "in-progress" => Ok(ConversationState::InProgress),
            "awaiting_response" | "awaitingresponse" | "awaiting-response" => {
                Ok(ConversationState::AwaitingResponse)
            }
            "completed" | "complete" => Ok(ConversationState::Completed),
            "terminated" => Ok(ConversationState::Terminated),
            "error" => Ok(ConversationState::Error),
            _ => Err(ConversationStateParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid conversation state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStateParseError(pub String);

impl fmt::Display for ConversationStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid conversation state: {}", self.0)
    }
}

impl std::error::Error for ConversationStateParseError {}

// ============================================================================
// MESSAGES
// ============================================================================

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A single agent, by id or speaker label
    Agent(String),
    /// Every participant
    Group,
    /// The workflow engine
    Workflow,
}

impl Recipient {
    /// Map a transcript address (`group`, `workflow` or a label) to a recipient.
    pub fn from_address(address: &str) -> Self {
        match address {
            "group" => Recipient::Group,
            "workflow" => Recipient::Workflow,
            other => Recipient::Agent(other.to_string()),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => f.write_str(id),
            Recipient::Group => f.write_str("group"),
            Recipient::Workflow => f.write_str("workflow"),
        }
    }
}

/// Kind of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    TaskHandoff,
    TaskAnnouncement,
    TaskCompletion,
    Acknowledgment,
    Direct,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
            MessageKind::TaskHandoff => "task_handoff",
            MessageKind::TaskAnnouncement => "task_announcement",
            MessageKind::TaskCompletion => "task_completion",
            MessageKind::Acknowledgment => "acknowledgment",
            MessageKind::Direct => "direct",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Sender id or speaker label
    pub sender: String,
    pub recipient: Recipient,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: Timestamp,
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    pub metadata: Value,
}

// ============================================================================
// CONVERSATION
// ============================================================================

/// Typed conversation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Pattern this conversation runs, absent for direct conversations
    pub pattern: Option<String>,
    /// Initiating context
    pub context: HashMap<String, Value>,
    /// Number of workflow steps started (1-based)
    pub workflow_step: usize,
    /// Outputs produced so far
    pub workflow_outputs: WorkflowValues,
    /// Cumulative outputs, set on completion
    pub final_outputs: Option<WorkflowValues>,
    /// Failure description, set on Error
    pub error: Option<String>,
    /// Reason given when terminated
    pub termination_reason: Option<String>,
    /// Two-party direct conversation
    pub direct: bool,
}

/// A conversation thread between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// Participant role names, or party ids for direct conversations
    pub participants: Vec<String>,
    pub topic: String,
    pub state: ConversationState,
    pub messages: Vec<Message>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub metadata: ConversationMetadata,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        participants: Vec<String>,
        topic: impl Into<String>,
        metadata: ConversationMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            participants,
            topic: topic.into(),
            state: ConversationState::Initiated,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: ConversationState) -> Result<(), OrchestrationError> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                id: self.id.to_string(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append a message addressed from this conversation. Returns its id.
    pub fn push_message(
        &mut self,
        sender: impl Into<String>,
        recipient: Recipient,
        content: impl Into<String>,
        kind: MessageKind,
        metadata: Value,
    ) -> MessageId {
        let now = Utc::now();
        let message = Message {
            id: Uuid::now_v7(),
            sender: sender.into(),
            recipient,
            content: content.into(),
            kind,
            timestamp: now,
            conversation_id: self.id.clone(),
            metadata,
        };
        let id = message.id;
        self.messages.push(message);
        self.updated_at = now;
        id
    }

    /// Record that step `step` (1-based) has started. Never moves backwards.
    pub fn advance_step(&mut self, step: usize) {
        if step > self.metadata.workflow_step {
            self.metadata.workflow_step = step;
            self.updated_at = Utc::now();
        }
    }

    pub fn status(&self) -> ConversationStatus {
        ConversationStatus {
            conversation_id: self.id.clone(),
            participants: self.participants.clone(),
            topic: self.topic.clone(),
            state: self.state,
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            workflow_step: self.metadata.workflow_step,
            final_outputs: self.metadata.final_outputs.clone().unwrap_or_default(),
            error: self.metadata.error.clone(),
        }
    }
}

/// Status summary of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationStatus {
    pub conversation_id: ConversationId,
    pub participants: Vec<String>,
    pub topic: String,
    pub state: ConversationState,
    pub message_count: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub workflow_step: usize,
    /// Empty until the conversation completes
    pub final_outputs: WorkflowValues,
    pub error: Option<String>,
}
