//! Memory fragments and queries

use chrono::{DateTime, Utc};
use hivemind_core::{
    clamp_unit_f32, new_fragment_id, AgentId, EmbeddingVector, FragmentId, HiveError,
    HiveResult, MemoryError, MemoryType, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Owner id used for fragments written by services rather than agents.
pub const SYSTEM_AGENT_ID: AgentId = Uuid::nil();

/// Flat string-keyed metadata, the format exchanged with memory backends.
pub type FlatMetadata = BTreeMap<String, String>;

// ============================================================================
// MEMORY FRAGMENT
// ============================================================================

/// One unit of stored memory content with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    /// Fragment identifier
    pub id: FragmentId,
    /// Text content
    pub content: String,
    /// Owning agent
    pub agent_id: AgentId,
    /// Role label of the owning agent
    pub agent_role: String,
    /// Kind of memory
    pub memory_type: MemoryType,
    /// Creation time
    pub timestamp: Timestamp,
    /// Importance in [0, 1]
    pub importance: f32,
    /// Number of times a query returned this fragment
    pub access_count: u32,
    /// Last time a query returned this fragment
    pub last_accessed: Timestamp,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
}

impl MemoryFragment {
    /// Create a fresh fragment stamped with the current time.
    pub fn new(
        agent_id: AgentId,
        agent_role: impl Into<String>,
        content: impl Into<String>,
        memory_type: MemoryType,
        importance: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_fragment_id(),
            content: content.into(),
            agent_id,
            agent_role: agent_role.into(),
            memory_type,
            timestamp: now,
            importance: clamp_unit_f32(importance),
            access_count: 0,
            last_accessed: now,
            tags: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<FragmentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Backdate creation and last access, e.g. for imported or aged fragments.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self.last_accessed = timestamp;
        self
    }

    pub fn with_access_count(mut self, access_count: u32) -> Self {
        self.access_count = access_count;
        self
    }

    /// Clamp importance into [0, 1].
    pub fn normalized(mut self) -> Self {
        self.importance = clamp_unit_f32(self.importance);
        self
    }

    /// Record one read access.
    pub fn touch(&mut self, at: Timestamp) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = at;
    }

    /// Convert to the backend's flat metadata map. Content, id and embedding
    /// travel separately.
    pub fn to_metadata(&self) -> FlatMetadata {
        let mut metadata = FlatMetadata::new();
        metadata.insert("agent_id".to_string(), self.agent_id.to_string());
        metadata.insert("agent_role".to_string(), self.agent_role.clone());
        metadata.insert("memory_type".to_string(), self.memory_type.as_tag());
        metadata.insert("timestamp".to_string(), self.timestamp.to_rfc3339());
        metadata.insert("importance".to_string(), self.importance.to_string());
        metadata.insert("access_count".to_string(), self.access_count.to_string());
        metadata.insert("last_accessed".to_string(), self.last_accessed.to_rfc3339());
        metadata.insert(
            "tags".to_string(),
            serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string()),
        );
        metadata
    }

    /// Rebuild a fragment from the backend's flat metadata map.
    pub fn from_metadata(
        id: FragmentId,
        content: String,
        metadata: &FlatMetadata,
        embedding: Option<EmbeddingVector>,
    ) -> HiveResult<Self> {
        fn field<'a>(metadata: &'a FlatMetadata, key: &str) -> HiveResult<&'a str> {
            metadata.get(key).map(String::as_str).ok_or_else(|| {
                HiveError::Memory(MemoryError::Serialization {
                    reason: format!("metadata missing {key}"),
                })
            })
        }
        fn bad(key: &str, reason: impl std::fmt::Display) -> HiveError {
            HiveError::Memory(MemoryError::Serialization {
                reason: format!("metadata field {key}: {reason}"),
            })
        }
        fn time(metadata: &FlatMetadata, key: &str) -> HiveResult<Timestamp> {
            DateTime::parse_from_rfc3339(field(metadata, key)?)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| bad(key, e))
        }

        let tags = match metadata.get("tags") {
            Some(raw) => serde_json::from_str(raw).map_err(|e| bad("tags", e))?,
            None => Vec::new(),
        };

        Ok(Self {
            id,
            content,
            agent_id: field(metadata, "agent_id")?
                .parse()
                .map_err(|e| bad("agent_id", e))?,
            agent_role: field(metadata, "agent_role")?.to_string(),
            memory_type: field(metadata, "memory_type")?
                .parse()
                .map_err(|e| bad("memory_type", e))?,
            timestamp: time(metadata, "timestamp")?,
            importance: field(metadata, "importance")?
                .parse()
                .map_err(|e| bad("importance", e))?,
            access_count: field(metadata, "access_count")?
                .parse()
                .map_err(|e| bad("access_count", e))?,
            last_accessed: time(metadata, "last_accessed")?,
            tags,
            embedding,
        }
        .normalized())
    }
}

/// Order by importance descending, then recency descending, then id.
pub fn by_importance_then_recency(a: &MemoryFragment, b: &MemoryFragment) -> Ordering {
    b.importance
        .partial_cmp(&a.importance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// MEMORY QUERY
// ============================================================================

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Filtered, ranked retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Free text; empty matches everything
    pub query_text: String,
    /// Only fragments owned by this agent
    pub agent_id: Option<AgentId>,
    /// Only fragments of these types
    pub memory_types: Option<Vec<MemoryType>>,
    /// Only fragments created inside this window
    pub time_range: Option<TimeRange>,
    /// Only fragments at least this important
    pub min_importance: f32,
    /// Result limit
    pub max_results: usize,
    /// Keep embeddings on returned fragments
    pub include_embeddings: bool,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            query_text: String::new(),
            agent_id: None,
            memory_types: None,
            time_range: None,
            min_importance: 0.0,
            max_results: 10,
            include_embeddings: false,
        }
    }
}

impl MemoryQuery {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Self::default()
        }
    }

    pub fn for_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.memory_types = Some(types);
        self
    }

    pub fn within(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_min_importance(mut self, min_importance: f32) -> Self {
        self.min_importance = min_importance;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_embeddings(mut self) -> Self {
        self.include_embeddings = true;
        self
    }

    /// Whether a fragment passes the structured filters (not the text).
    pub fn admits(&self, fragment: &MemoryFragment) -> bool {
        if let Some(agent_id) = self.agent_id {
            if fragment.agent_id != agent_id {
                return false;
            }
        }
        if let Some(types) = &self.memory_types {
            if !types.contains(&fragment.memory_type) {
                return false;
            }
        }
        if let Some(range) = &self.time_range {
            if !range.contains(fragment.timestamp) {
                return false;
            }
        }
        fragment.importance >= self.min_importance
    }

    /// Case-insensitive substring match; empty text matches everything.
    pub fn matches_text(&self, fragment: &MemoryFragment) -> bool {
        let needle = self.query_text.trim();
        needle.is_empty() || fragment.content.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hivemind_core::new_agent_id;

    fn fragment(content: &str, importance: f32) -> MemoryFragment {
        MemoryFragment::new(new_agent_id(), "Engineer", content, MemoryType::Experience, importance)
    }

    #[test]
    fn test_new_clamps_importance() {
        assert_eq!(fragment("x", 1.7).importance, 1.0);
        assert_eq!(fragment("x", -0.2).importance, 0.0);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let original = fragment("inverter sizing notes", 0.6)
            .with_tags(["solar", "design, draft"])
            .with_access_count(3);
        let metadata = original.to_metadata();
        assert_eq!(metadata["memory_type"], "experience");

        let rebuilt = MemoryFragment::from_metadata(
            original.id.clone(),
            original.content.clone(),
            &metadata,
            None,
        )
        .unwrap();
        assert_eq!(rebuilt.tags, original.tags);
        assert_eq!(rebuilt.access_count, 3);
        assert_eq!(rebuilt.agent_id, original.agent_id);
        assert_eq!(rebuilt.timestamp, original.timestamp);
        assert!((rebuilt.importance - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_metadata_missing_field_is_error() {
        let mut metadata = fragment("x", 0.5).to_metadata();
        metadata.remove("agent_id");
        let result = MemoryFragment::from_metadata("id".into(), "x".into(), &metadata, None);
        assert!(matches!(
            result,
            Err(HiveError::Memory(MemoryError::Serialization { .. }))
        ));
    }

    #[test]
    fn test_query_filters() {
        let owner = new_agent_id();
        let base = MemoryFragment::new(owner, "Analyst", "Grid study", MemoryType::Knowledge, 0.4);

        assert!(MemoryQuery::new("grid").matches_text(&base));
        assert!(MemoryQuery::new("").matches_text(&base));
        assert!(!MemoryQuery::new("payback").matches_text(&base));

        assert!(MemoryQuery::default().for_agent(owner).admits(&base));
        assert!(!MemoryQuery::default().for_agent(new_agent_id()).admits(&base));
        assert!(!MemoryQuery::default()
            .with_types(vec![MemoryType::Decision])
            .admits(&base));
        assert!(!MemoryQuery::default().with_min_importance(0.5).admits(&base));

        let now = Utc::now();
        let window = TimeRange::new(now - Duration::days(1), now + Duration::days(1));
        assert!(MemoryQuery::default().within(window).admits(&base));
        let past = TimeRange::new(now - Duration::days(3), now - Duration::days(2));
        assert!(!MemoryQuery::default().within(past).admits(&base));
    }

    #[test]
    fn test_ranking_order() {
        let now = Utc::now();
        let mut fragments = vec![
            fragment("low", 0.1).with_timestamp(now),
            fragment("high old", 0.9).with_timestamp(now - Duration::hours(2)),
            fragment("high new", 0.9).with_timestamp(now),
        ];
        fragments.sort_by(by_importance_then_recency);
        let order: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(order, vec!["high new", "high old", "low"]);
    }
}
