//! Report and document types produced by the memory store

use crate::fragment::MemoryFragment;
use hivemind_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-agent memory summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub agent_id: AgentId,
    /// Number of fragments owned by the agent
    pub total: usize,
    /// Fragment count per memory type tag
    pub memory_types: BTreeMap<String, usize>,
    /// Mean importance, 0 when there are no fragments
    pub avg_importance: f64,
    /// Fragments created in the last 24 hours
    pub recent_24h: usize,
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
}

/// Outcome of one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Fragments examined
    pub processed: usize,
    /// Original fragments folded into synthetic ones
    pub consolidated: usize,
    /// Net reduction in fragment count
    pub freed: usize,
    /// Eligible groups left for the next pass after a conflict
    pub skipped_conflicts: usize,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total: usize,
    pub memory_types: BTreeMap<String, usize>,
    /// Fragment count per owning agent id
    pub agents: BTreeMap<String, usize>,
    pub avg_importance: f64,
    /// `vector`, `keyword` or `keyword (degraded)`
    pub storage_backend: String,
}

/// On-disk export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_timestamp: Timestamp,
    /// Agent filter the export was taken with
    pub agent_id: Option<AgentId>,
    pub memory_count: usize,
    pub memories: Vec<MemoryFragment>,
}

/// Fragment count per memory type tag.
pub(crate) fn type_histogram<'a>(
    fragments: impl IntoIterator<Item = &'a MemoryFragment>,
) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for fragment in fragments {
        *histogram.entry(fragment.memory_type.as_tag()).or_insert(0) += 1;
    }
    histogram
}

pub(crate) fn mean_importance(fragments: &[MemoryFragment]) -> f64 {
    if fragments.is_empty() {
        return 0.0;
    }
    fragments.iter().map(|f| f64::from(f.importance)).sum::<f64>() / fragments.len() as f64
}
