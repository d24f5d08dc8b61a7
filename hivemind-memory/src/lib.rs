//! HIVEMIND Memory - Long-Term Memory Store
//!
//! Fragments are stored through a [`MemoryBackend`]: a vector index when
//! available, otherwise an in-process keyword map. The [`MemoryStore`] service
//! adds access tracking, consolidation, export/import and statistics on top.

mod backend;
mod fragment;
mod reports;
mod store;

pub use backend::{KeywordBackend, MemoryBackend, VectorIndexBackend};
pub use fragment::{
    by_importance_then_recency, FlatMetadata, MemoryFragment, MemoryQuery, TimeRange,
    SYSTEM_AGENT_ID,
};
pub use reports::{ConsolidationReport, ExportDocument, MemoryStatistics, MemorySummary};
pub use store::MemoryStore;
