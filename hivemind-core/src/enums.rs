//! Enum types for HIVEMIND entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AGENT ROLES
// ============================================================================

/// Specialized role of an agent in the collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentRole {
    /// Designs and refines systems
    Engineer,
    /// Performance and layout design
    Designer,
    /// Grid and impact analysis
    Analyst,
    /// Uncertainty and scenario evaluation
    Philosopher,
    /// Code and regulatory compliance
    ComplianceOfficer,
    /// Generation and weather forecasting
    WeatherOracle,
    /// Cost and return modelling
    FinancialAdvisor,
    /// Exploration of optimization scenarios
    Navigator,
}

impl AgentRole {
    /// Every role, in canonical roster order.
    pub const ALL: [AgentRole; 8] = [
        AgentRole::Engineer,
        AgentRole::Designer,
        AgentRole::Analyst,
        AgentRole::Philosopher,
        AgentRole::ComplianceOfficer,
        AgentRole::WeatherOracle,
        AgentRole::FinancialAdvisor,
        AgentRole::Navigator,
    ];

    /// Canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Engineer => "Engineer",
            AgentRole::Designer => "Designer",
            AgentRole::Analyst => "Analyst",
            AgentRole::Philosopher => "Philosopher",
            AgentRole::ComplianceOfficer => "ComplianceOfficer",
            AgentRole::WeatherOracle => "WeatherOracle",
            AgentRole::FinancialAdvisor => "FinancialAdvisor",
            AgentRole::Navigator => "Navigator",
        }
    }

    /// Parse a role name. Case and `_`/`-` separators are ignored.
    pub fn parse(s: &str) -> Result<Self, AgentRoleParseError> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "engineer" => Ok(AgentRole::Engineer),
            "designer" => Ok(AgentRole::Designer),
            "analyst" => Ok(AgentRole::Analyst),
            "philosopher" => Ok(AgentRole::Philosopher),
            "complianceofficer" => Ok(AgentRole::ComplianceOfficer),
            "weatheroracle" => Ok(AgentRole::WeatherOracle),
            "financialadvisor" => Ok(AgentRole::FinancialAdvisor),
            "navigator" => Ok(AgentRole::Navigator),
            _ => Err(AgentRoleParseError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = AgentRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an invalid agent role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoleParseError(pub String);

impl fmt::Display for AgentRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent role: {}", self.0)
    }
}

impl std::error::Error for AgentRoleParseError {}

/// Capability tier of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTier {
    /// Base model capabilities only
    Raw,
    /// Can call tools
    ToolUser,
    /// Manages other agents
    Orchestrator,
    /// Retrieval-augmented historical analysis
    Sage,
}

impl AgentTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTier::Raw => "raw",
            AgentTier::ToolUser => "tool_user",
            AgentTier::Orchestrator => "orchestrator",
            AgentTier::Sage => "sage",
        }
    }
}

impl fmt::Display for AgentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Kind of memory a fragment holds.
///
/// Serialized as a flat tag: `experience`, `knowledge`, `conversation`,
/// `decision`, or `consolidated-<inner>` for synthetic summary fragments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MemoryType {
    Experience,
    Knowledge,
    Conversation,
    Decision,
    /// Produced by consolidating many fragments of the inner type
    Consolidated(Box<MemoryType>),
}

/// Deepest `consolidated-` nesting a memory type can carry.
pub const MAX_CONSOLIDATION_DEPTH: usize = 16;

impl MemoryType {
    /// Wrap this type as the result of a consolidation. Saturates at
    /// [`MAX_CONSOLIDATION_DEPTH`].
    pub fn consolidated(self) -> Self {
        if self.consolidation_depth() >= MAX_CONSOLIDATION_DEPTH {
            return self;
        }
        MemoryType::Consolidated(Box::new(self))
    }

    /// How many consolidation layers wrap the base type.
    pub fn consolidation_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let MemoryType::Consolidated(inner) = current {
            depth += 1;
            current = inner;
        }
        depth
    }

    /// Whether this fragment was produced by consolidation.
    pub fn is_consolidated(&self) -> bool {
        matches!(self, MemoryType::Consolidated(_))
    }

    /// Render as the flat tag.
    pub fn as_tag(&self) -> String {
        match self {
            MemoryType::Experience => "experience".to_string(),
            MemoryType::Knowledge => "knowledge".to_string(),
            MemoryType::Conversation => "conversation".to_string(),
            MemoryType::Decision => "decision".to_string(),
            MemoryType::Consolidated(inner) => format!("consolidated-{}", inner.as_tag()),
        }
    }

    /// Parse the flat tag. `consolidated_` is accepted as a legacy separator.
    /// Tags nested deeper than [`MAX_CONSOLIDATION_DEPTH`] are rejected.
    pub fn parse(s: &str) -> Result<Self, MemoryTypeParseError> {
        let lower = s.trim().to_lowercase();
        let mut rest = lower.as_str();
        let mut depth = 0usize;
        while let Some(inner) = rest
            .strip_prefix("consolidated-")
            .or_else(|| rest.strip_prefix("consolidated_"))
        {
            rest = inner;
            depth += 1;
            if depth > MAX_CONSOLIDATION_DEPTH {
                return Err(MemoryTypeParseError(s.to_string()));
            }
        }
        let mut parsed = match rest {
            "experience" => MemoryType::Experience,
            "knowledge" => MemoryType::Knowledge,
            "conversation" => MemoryType::Conversation,
            "decision" => MemoryType::Decision,
            _ => return Err(MemoryTypeParseError(s.to_string())),
        };
        for _ in 0..depth {
            parsed = parsed.consolidated();
        }
        Ok(parsed)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

impl FromStr for MemoryType {
    type Err = MemoryTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MemoryType {
    type Error = MemoryTypeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemoryType> for String {
    fn from(value: MemoryType) -> Self {
        value.as_tag()
    }
}

/// Error when parsing an invalid memory type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTypeParseError(pub String);

impl fmt::Display for MemoryTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid memory type: {}", self.0)
    }
}

impl std::error::Error for MemoryTypeParseError {}

// ============================================================================
// TESTS
// ============================================================================
