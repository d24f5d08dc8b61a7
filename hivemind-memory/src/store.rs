//! The memory store service

use crate::backend::{KeywordBackend, MemoryBackend, VectorIndexBackend};
use crate::fragment::{by_importance_then_recency, MemoryFragment, MemoryQuery};
use crate::reports::{
    mean_importance, type_histogram, ConsolidationReport, ExportDocument, MemoryStatistics,
    MemorySummary,
};
use chrono::{Duration, Utc};
use hivemind_capabilities::{EmbeddingProvider, HashingEmbedder};
use hivemind_core::{
    write_atomic, AgentId, FragmentId, HiveError, HiveResult, MemoryConfig, MemoryError,
    MemoryType,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Run `$call` against the primary backend while it is healthy, degrading to
/// the keyword fallback when it errors.
macro_rules! route {
    ($store:expr, $op:expr, |$b:ident| $call:expr) => {{
        let mut routed = None;
        if let Some($b) = $store.healthy_primary() {
            match $call.await {
                Ok(value) => routed = Some(value),
                Err(e) => $store.degrade($op, &e),
            }
        }
        match routed {
            Some(value) => Ok(value),
            None => {
                let $b = &$store.fallback;
                $call.await
            }
        }
    }};
}

// ============================================================================
// PINS
// ============================================================================

/// Releases a query's pins when dropped.
struct PinGuard<'a> {
    pins: &'a Mutex<HashMap<FragmentId, usize>>,
    ids: Vec<FragmentId>,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pins) = self.pins.lock() {
            for id in &self.ids {
                if let Some(count) = pins.get_mut(id) {
                    *count -= 1;
                    if *count == 0 {
                        pins.remove(id);
                    }
                }
            }
        }
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Shared long-term memory.
///
/// Every mutation (store, delete, access touch) bumps a generation token.
/// A query holds the read side of `reads` from before its search until its
/// access touch lands, and pins the fragments it selected. A group rewrite
/// holds the write side across its store and deletes, so no query starts
/// until it is done. Consolidation treats a query in flight as a conflict,
/// as it does a moved generation or a pinned member.
pub struct MemoryStore {
    config: MemoryConfig,
    primary: Option<Arc<dyn MemoryBackend>>,
    fallback: KeywordBackend,
    degraded: AtomicBool,
    generation: AtomicU64,
    reads: RwLock<()>,
    pins: Mutex<HashMap<FragmentId, usize>>,
}

impl MemoryStore {
    /// Create a store over an optional primary backend.
    pub fn new(config: MemoryConfig, primary: Option<Arc<dyn MemoryBackend>>) -> Self {
        Self {
            config,
            primary,
            fallback: KeywordBackend::new(),
            degraded: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reads: RwLock::new(()),
            pins: Mutex::new(HashMap::new()),
        }
    }

    /// Store backed by a vector index over the given embedder.
    pub fn with_vector_index(config: MemoryConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let backend: Arc<dyn MemoryBackend> = Arc::new(VectorIndexBackend::new(embedder));
        Self::new(config, Some(backend))
    }

    /// Store using only the in-process keyword backend.
    pub fn keyword_only(config: MemoryConfig) -> Self {
        Self::new(config, None)
    }

    /// Build the store the configuration asks for.
    pub fn from_config(config: MemoryConfig) -> Self {
        if config.vector_backend {
            let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimensions));
            Self::with_vector_index(config, embedder)
        } else {
            Self::keyword_only(config)
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Current generation token.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether the primary backend failed and the fallback took over.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Label of the backend currently serving requests.
    pub fn backend_label(&self) -> String {
        match (&self.primary, self.is_degraded()) {
            (Some(primary), false) => primary.label().to_string(),
            (Some(_), true) => format!("{} (degraded)", self.fallback.label()),
            (None, _) => self.fallback.label().to_string(),
        }
    }

    fn healthy_primary(&self) -> Option<&Arc<dyn MemoryBackend>> {
        self.primary.as_ref().filter(|_| !self.is_degraded())
    }

    fn degrade(&self, operation: &str, error: &HiveError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                operation,
                error = %error,
                "Memory backend unavailable, switching to keyword fallback"
            );
        }
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn pin(&self, ids: &[FragmentId]) -> HiveResult<PinGuard<'_>> {
        let mut pins = self
            .pins
            .lock()
            .map_err(|_| HiveError::Memory(MemoryError::LockPoisoned))?;
        for id in ids {
            *pins.entry(id.clone()).or_insert(0) += 1;
        }
        Ok(PinGuard {
            pins: &self.pins,
            ids: ids.to_vec(),
        })
    }

    fn any_pinned(&self, fragments: &[MemoryFragment]) -> HiveResult<bool> {
        let pins = self
            .pins
            .lock()
            .map_err(|_| HiveError::Memory(MemoryError::LockPoisoned))?;
        Ok(fragments.iter().any(|f| pins.contains_key(&f.id)))
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Upsert a fragment by id. Importance is clamped.
    ///
    /// A failing primary backend degrades the store to the keyword fallback;
    /// the caller still sees success.
    pub async fn store(&self, fragment: MemoryFragment) -> HiveResult<bool> {
        let fragment = fragment.normalized();
        let id = fragment.id.clone();
        route!(self, "store", |backend| backend.upsert(fragment.clone()))?;
        self.bump();
        debug!(fragment_id = %id, "Stored memory fragment");
        Ok(true)
    }

    /// Build and store a fragment, returning its id.
    pub async fn store_experience(
        &self,
        agent_id: AgentId,
        agent_role: &str,
        content: impl Into<String>,
        memory_type: MemoryType,
        importance: f32,
        tags: Vec<String>,
    ) -> HiveResult<FragmentId> {
        let fragment =
            MemoryFragment::new(agent_id, agent_role, content, memory_type, importance).with_tags(tags);
        let id = fragment.id.clone();
        self.store(fragment).await?;
        Ok(id)
    }

    /// Delete a fragment. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> HiveResult<bool> {
        let removed = route!(self, "delete", |backend| backend.delete(id))?;
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Ranked retrieval. Every returned fragment has its access count
    /// incremented and last access refreshed.
    pub async fn query(&self, query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
        let _reading = self.reads.read().await;
        let mut results = route!(self, "query", |backend| backend.search(query))?;
        if results.is_empty() {
            return Ok(results);
        }

        let ids: Vec<FragmentId> = results.iter().map(|f| f.id.clone()).collect();
        let _pins = self.pin(&ids)?;
        let now = Utc::now();
        route!(self, "touch", |backend| backend.touch(&ids, now))?;
        self.bump();

        for fragment in &mut results {
            fragment.touch(now);
            if !query.include_embeddings {
                fragment.embedding = None;
            }
        }
        debug!(
            query = %query.query_text,
            results = results.len(),
            "Memory query served"
        );
        Ok(results)
    }

    /// Point lookup without touching access counters.
    pub async fn get(&self, id: &str) -> HiveResult<Option<MemoryFragment>> {
        route!(self, "get", |backend| backend.get(id))
    }

    async fn scan(&self, agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
        route!(self, "scan", |backend| backend.scan(agent_id))
    }

    /// Summary of one agent's memories.
    pub async fn summarize(&self, agent_id: AgentId) -> HiveResult<MemorySummary> {
        let fragments = self.scan(Some(agent_id)).await?;
        let day_ago = Utc::now() - Duration::hours(24);
        Ok(MemorySummary {
            agent_id,
            total: fragments.len(),
            memory_types: type_histogram(&fragments),
            avg_importance: mean_importance(&fragments),
            recent_24h: fragments.iter().filter(|f| f.timestamp > day_ago).count(),
            oldest: fragments.iter().map(|f| f.timestamp).min(),
            newest: fragments.iter().map(|f| f.timestamp).max(),
        })
    }

    /// Store-wide statistics.
    pub async fn statistics(&self) -> HiveResult<MemoryStatistics> {
        let fragments = self.scan(None).await?;
        let mut agents = BTreeMap::new();
        for fragment in &fragments {
            *agents.entry(fragment.agent_id.to_string()).or_insert(0) += 1;
        }
        Ok(MemoryStatistics {
            total: fragments.len(),
            memory_types: type_histogram(&fragments),
            agents,
            avg_importance: mean_importance(&fragments),
            storage_backend: self.backend_label(),
        })
    }

    // ------------------------------------------------------------------------
    // Consolidation
    // ------------------------------------------------------------------------

    fn is_candidate(&self, fragment: &MemoryFragment, cutoff: chrono::DateTime<Utc>) -> bool {
        fragment.timestamp < cutoff
            && fragment.importance <= self.config.consolidation_max_importance
            && fragment.access_count <= self.config.consolidation_max_access
    }

    /// Fold old, unimportant, rarely read fragments into summary fragments.
    ///
    /// Candidates must pass all three gates (age, importance, access count).
    /// They are grouped by (role, type) and only groups larger than the
    /// configured minimum are rewritten. Any conflict described on
    /// [`MemoryStore`] ends the pass early; the remaining groups are reported in
    /// `skipped_conflicts` and retried next time.
    pub async fn consolidate(&self, agent_id: Option<AgentId>) -> HiveResult<ConsolidationReport> {
        let mut expected = self.generation();
        let fragments = self.scan(agent_id).await?;
        let mut report = ConsolidationReport {
            processed: fragments.len(),
            ..ConsolidationReport::default()
        };

        let cutoff = Utc::now() - Duration::days(self.config.consolidation_age_days);
        let mut groups: BTreeMap<(String, String), Vec<MemoryFragment>> = BTreeMap::new();
        for fragment in fragments {
            if self.is_candidate(&fragment, cutoff) {
                groups
                    .entry((fragment.agent_role.clone(), fragment.memory_type.as_tag()))
                    .or_default()
                    .push(fragment);
            }
        }
        let eligible: Vec<Vec<MemoryFragment>> = groups
            .into_values()
            .filter(|group| group.len() > self.config.consolidation_min_group)
            .collect();

        for (index, group) in eligible.iter().enumerate() {
            match self.rewrite_group(group, expected).await {
                Ok(writes) => {
                    expected += writes;
                    report.consolidated += group.len();
                    report.freed += group.len() - 1;
                }
                Err(HiveError::Memory(MemoryError::ConsolidationConflict {
                    expected: selected,
                    observed,
                })) => {
                    report.skipped_conflicts = eligible.len() - index;
                    debug!(
                        expected = selected,
                        observed,
                        skipped = report.skipped_conflicts,
                        "Consolidation conflict, deferring remaining groups"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            processed = report.processed,
            consolidated = report.consolidated,
            freed = report.freed,
            skipped_conflicts = report.skipped_conflicts,
            "Memory consolidation pass finished"
        );
        Ok(report)
    }

    /// Replace one group by its synthetic fragment. Returns the number of
    /// generation bumps this rewrite performed.
    async fn rewrite_group(&self, group: &[MemoryFragment], expected: u64) -> HiveResult<u64> {
        let conflict = |observed| {
            HiveError::Memory(MemoryError::ConsolidationConflict { expected, observed })
        };
        let Ok(_rewriting) = self.reads.try_write() else {
            return Err(conflict(self.generation()));
        };
        let observed = self.generation();
        if observed != expected || self.any_pinned(group)? {
            return Err(conflict(observed));
        }

        let synthetic = self.synthesize(group);
        let synthetic_id = synthetic.id.clone();
        self.store(synthetic).await?;
        let mut writes = 1;
        for fragment in group {
            if self.delete(&fragment.id).await? {
                writes += 1;
            }
        }
        debug!(
            fragment_id = %synthetic_id,
            members = group.len(),
            "Consolidated memory group"
        );
        Ok(writes)
    }

    fn synthesize(&self, group: &[MemoryFragment]) -> MemoryFragment {
        let mut ranked: Vec<&MemoryFragment> = group.iter().collect();
        ranked.sort_by(|a, b| by_importance_then_recency(a, b));
        let representatives: Vec<String> = ranked
            .iter()
            .take(self.config.consolidation_representatives)
            .map(|f| format!("{}...", f.content.chars().take(50).collect::<String>()))
            .collect();
        let content = format!(
            "Consolidated {} experiences: {}",
            group.len(),
            representatives.join("; ")
        );

        let base = ranked[0];
        let importance = base.importance.min(self.config.consolidated_importance_cap);
        let tags: BTreeSet<&str> = group
            .iter()
            .flat_map(|f| f.tags.iter().map(String::as_str))
            .collect();

        MemoryFragment::new(
            base.agent_id,
            base.agent_role.clone(),
            content,
            base.memory_type.clone().consolidated(),
            importance,
        )
        .with_tags(tags)
    }

    // ------------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------------

    /// Write the (optionally agent-filtered) fragment set as pretty JSON.
    pub async fn export(&self, path: &Path, agent_id: Option<AgentId>) -> HiveResult<bool> {
        let mut memories = self.scan(agent_id).await?;
        memories.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        for fragment in &mut memories {
            fragment.embedding = None;
        }

        let document = ExportDocument {
            export_timestamp: Utc::now(),
            agent_id,
            memory_count: memories.len(),
            memories,
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|e| {
            HiveError::Memory(MemoryError::Serialization {
                reason: e.to_string(),
            })
        })?;
        write_atomic(path, &json).map_err(|e| {
            HiveError::Memory(MemoryError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;

        info!(
            path = %path.display(),
            memory_count = document.memory_count,
            "Exported memories"
        );
        Ok(true)
    }

    /// Re-store every fragment of an export document. Returns how many were stored.
    pub async fn import(&self, path: &Path) -> HiveResult<usize> {
        let raw = std::fs::read(path).map_err(|e| {
            HiveError::Memory(MemoryError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let document: ExportDocument = serde_json::from_slice(&raw).map_err(|e| {
            HiveError::Memory(MemoryError::Serialization {
                reason: e.to_string(),
            })
        })?;

        let mut stored = 0;
        for fragment in document.memories {
            if self.store(fragment).await? {
                stored += 1;
            }
        }
        info!(path = %path.display(), stored, "Imported memories");
        Ok(stored)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("backend", &self.backend_label())
            .field("generation", &self.generation())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hivemind_core::{new_agent_id, Timestamp};
    use tokio::sync::Notify;

    fn store() -> MemoryStore {
        MemoryStore::from_config(MemoryConfig::default())
    }

    fn aged(agent_id: AgentId, role: &str, content: &str, importance: f32, days: i64) -> MemoryFragment {
        MemoryFragment::new(agent_id, role, content, MemoryType::Experience, importance)
            .with_timestamp(Utc::now() - Duration::days(days))
    }

    /// Backend that refuses every call.
    struct OfflineBackend;

    fn offline() -> HiveError {
        HiveError::Memory(MemoryError::BackendUnavailable {
            backend: "offline".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    #[async_trait]
    impl MemoryBackend for OfflineBackend {
        fn label(&self) -> &str {
            "offline"
        }
        async fn upsert(&self, _fragment: MemoryFragment) -> HiveResult<()> {
            Err(offline())
        }
        async fn search(&self, _query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
            Err(offline())
        }
        async fn get(&self, _id: &str) -> HiveResult<Option<MemoryFragment>> {
            Err(offline())
        }
        async fn delete(&self, _id: &str) -> HiveResult<bool> {
            Err(offline())
        }
        async fn scan(&self, _agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
            Err(offline())
        }
        async fn touch(&self, _ids: &[FragmentId], _at: Timestamp) -> HiveResult<()> {
            Err(offline())
        }
        async fn count(&self) -> HiveResult<usize> {
            Err(offline())
        }
    }

    #[tokio::test]
    async fn test_store_is_idempotent_on_id() {
        let store = store();
        let agent = new_agent_id();
        let first = MemoryFragment::new(agent, "Engineer", "draft layout", MemoryType::Knowledge, 0.5);
        let id = first.id.clone();
        let second = MemoryFragment {
            content: "final layout".to_string(),
            ..first.clone()
        };

        assert!(store.store(first).await.unwrap());
        assert!(store.store(second).await.unwrap());

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(store.get(&id).await.unwrap().unwrap().content, "final layout");
    }

    #[tokio::test]
    async fn test_query_touches_returned_fragments() {
        let store = MemoryStore::keyword_only(MemoryConfig::default());
        let agent = new_agent_id();
        let id = store
            .store_experience(agent, "Analyst", "Feeder hosting capacity", MemoryType::Knowledge, 0.7, vec![])
            .await
            .unwrap();
        let before = store.generation();

        let hits = store.query(&MemoryQuery::new("hosting")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].access_count, 1);
        assert!(store.generation() > before);

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 1);

        // get() is not a read access
        let again = store.get(&id).await.unwrap().unwrap();
        assert_eq!(again.access_count, 1);
    }

    #[tokio::test]
    async fn test_query_strips_embeddings_unless_requested() {
        let store = store();
        store
            .store_experience(new_agent_id(), "Designer", "string inverter layout", MemoryType::Experience, 0.5, vec![])
            .await
            .unwrap();

        let plain = store.query(&MemoryQuery::new("inverter")).await.unwrap();
        assert!(plain[0].embedding.is_none());
        let rich = store
            .query(&MemoryQuery::new("inverter").with_embeddings())
            .await
            .unwrap();
        assert!(rich[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_store_degrades_when_backend_offline() {
        let store = MemoryStore::new(MemoryConfig::default(), Some(Arc::new(OfflineBackend)));
        assert_eq!(store.backend_label(), "offline");

        let stored = store
            .store_experience(new_agent_id(), "Navigator", "scenario sweep", MemoryType::Decision, 0.4, vec![])
            .await
            .unwrap();
        assert!(store.is_degraded());
        assert_eq!(store.backend_label(), "keyword (degraded)");

        let hits = store.query(&MemoryQuery::new("sweep")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, stored);
    }

    #[tokio::test]
    async fn test_summarize_counts_by_type_and_recency() {
        let store = store();
        let agent = new_agent_id();
        store.store(aged(agent, "Engineer", "old", 0.2, 10)).await.unwrap();
        store
            .store(MemoryFragment::new(agent, "Engineer", "new", MemoryType::Decision, 0.6))
            .await
            .unwrap();
        store
            .store(MemoryFragment::new(new_agent_id(), "Designer", "other", MemoryType::Decision, 0.9))
            .await
            .unwrap();

        let summary = store.summarize(agent).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.memory_types["experience"], 1);
        assert_eq!(summary.memory_types["decision"], 1);
        assert_eq!(summary.recent_24h, 1);
        assert!((summary.avg_importance - 0.4).abs() < 1e-6);
        assert!(summary.oldest < summary.newest);
    }

    #[tokio::test]
    async fn test_consolidate_folds_eligible_group() {
        let store = store();
        let agent = new_agent_id();
        for i in 0..5 {
            let fragment = aged(agent, "Engineer", &format!("routine panel inspection number {i} with a long trailing description"), 0.1 + i as f32 * 0.01, 40)
                .with_tags([format!("tag{i}")]);
            store.store(fragment).await.unwrap();
        }
        // Protected: recent
        store.store(aged(agent, "Engineer", "fresh", 0.1, 1)).await.unwrap();
        // Protected: important
        store.store(aged(agent, "Engineer", "valuable", 0.9, 40)).await.unwrap();

        let report = store.consolidate(None).await.unwrap();
        assert_eq!(report.processed, 7);
        assert_eq!(report.consolidated, 5);
        assert_eq!(report.freed, 4);
        assert_eq!(report.skipped_conflicts, 0);

        let remaining = store.scan(None).await.unwrap();
        assert_eq!(remaining.len(), 3);
        let synthetic = remaining
            .iter()
            .find(|f| f.memory_type.is_consolidated())
            .unwrap();
        assert_eq!(synthetic.memory_type.as_tag(), "consolidated-experience");
        assert!(synthetic.content.starts_with("Consolidated 5 experiences: "));
        assert_eq!(synthetic.content.matches("...").count(), 3);
        assert!((synthetic.importance - 0.14).abs() < 1e-6);
        assert_eq!(synthetic.tags.len(), 5);
        assert_eq!(synthetic.agent_id, agent);
    }

    #[tokio::test]
    async fn test_consolidate_leaves_small_groups() {
        let store = store();
        let agent = new_agent_id();
        for i in 0..3 {
            store.store(aged(agent, "Analyst", &format!("note {i}"), 0.1, 60)).await.unwrap();
        }
        let report = store.consolidate(Some(agent)).await.unwrap();
        assert_eq!(report.consolidated, 0);
        assert_eq!(store.statistics().await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_consolidation_caps_importance() {
        let mut config = MemoryConfig::default();
        config.consolidation_max_importance = 1.0;
        let store = MemoryStore::from_config(config);
        let agent = new_agent_id();
        for i in 0..4 {
            store.store(aged(agent, "Philosopher", &format!("musing {i}"), 0.95, 45)).await.unwrap();
        }
        store.consolidate(None).await.unwrap();
        let remaining = store.scan(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!((remaining[0].importance - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_consolidation_skips_pinned_group() {
        let store = store();
        let agent = new_agent_id();
        let mut ids = Vec::new();
        for i in 0..4 {
            let fragment = aged(agent, "Engineer", &format!("log {i}"), 0.1, 40);
            ids.push(fragment.id.clone());
            store.store(fragment).await.unwrap();
        }

        let pinned = store.pin(&ids[..1]).unwrap();
        let report = store.consolidate(None).await.unwrap();
        assert_eq!(report.consolidated, 0);
        assert_eq!(report.skipped_conflicts, 1);
        assert_eq!(store.statistics().await.unwrap().total, 4);

        drop(pinned);
        let retry = store.consolidate(None).await.unwrap();
        assert_eq!(retry.consolidated, 4);
    }

    /// Keyword backend that parks the first `search` or `delete` until the
    /// gate is notified.
    struct GatedBackend {
        inner: KeywordBackend,
        gate: Arc<Notify>,
        on_delete: bool,
        parked: AtomicBool,
    }

    impl GatedBackend {
        fn new(gate: Arc<Notify>, on_delete: bool) -> Self {
            Self {
                inner: KeywordBackend::new(),
                gate,
                on_delete,
                parked: AtomicBool::new(false),
            }
        }

        async fn park_once(&self) {
            if !self.parked.swap(true, Ordering::AcqRel) {
                self.gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl MemoryBackend for GatedBackend {
        fn label(&self) -> &str {
            "gated"
        }
        async fn upsert(&self, fragment: MemoryFragment) -> HiveResult<()> {
            self.inner.upsert(fragment).await
        }
        async fn search(&self, query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
            let hits = self.inner.search(query).await?;
            if !self.on_delete {
                self.park_once().await;
            }
            Ok(hits)
        }
        async fn get(&self, id: &str) -> HiveResult<Option<MemoryFragment>> {
            self.inner.get(id).await
        }
        async fn delete(&self, id: &str) -> HiveResult<bool> {
            if self.on_delete {
                self.park_once().await;
            }
            self.inner.delete(id).await
        }
        async fn scan(&self, agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
            self.inner.scan(agent_id).await
        }
        async fn touch(&self, ids: &[FragmentId], at: Timestamp) -> HiveResult<()> {
            self.inner.touch(ids, at).await
        }
        async fn count(&self) -> HiveResult<usize> {
            self.inner.count().await
        }
    }

    async fn gated_store(on_delete: bool) -> (MemoryStore, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend: Arc<dyn MemoryBackend> = Arc::new(GatedBackend::new(gate.clone(), on_delete));
        let store = MemoryStore::new(MemoryConfig::default(), Some(backend));
        let agent = new_agent_id();
        for i in 0..4 {
            store.store(aged(agent, "Engineer", &format!("log {i}"), 0.1, 40)).await.unwrap();
        }
        (store, gate)
    }

    async fn release_after_yields(gate: &Notify) {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_consolidation_defers_while_query_in_flight() {
        let (store, gate) = gated_store(false).await;
        let query = MemoryQuery::new("log");

        let (hits, report, ()) = tokio::join!(
            store.query(&query),
            store.consolidate(None),
            release_after_yields(&gate)
        );
        let hits = hits.unwrap();
        let report = report.unwrap();

        assert_eq!(hits.len(), 4);
        assert_eq!(report.consolidated, 0);
        assert_eq!(report.skipped_conflicts, 1);
        for hit in &hits {
            assert!(store.get(&hit.id).await.unwrap().is_some());
        }

        let retry = store.consolidate(None).await.unwrap();
        assert_eq!(retry.consolidated, 4);
    }

    #[tokio::test]
    async fn test_query_waits_for_group_rewrite() {
        let (store, gate) = gated_store(true).await;
        let query = MemoryQuery::new("log");

        let (report, hits, ()) = tokio::join!(
            store.consolidate(None),
            async {
                tokio::task::yield_now().await;
                store.query(&query).await
            },
            release_after_yields(&gate)
        );
        let report = report.unwrap();
        let hits = hits.unwrap();

        assert_eq!(report.consolidated, 4);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory_type.is_consolidated());
        assert!(store.get(&hits[0].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rewrite_group_detects_generation_change() {
        let store = store();
        let agent = new_agent_id();
        let group: Vec<MemoryFragment> = (0..4)
            .map(|i| aged(agent, "Engineer", &format!("entry {i}"), 0.1, 40))
            .collect();
        for fragment in &group {
            store.store(fragment.clone()).await.unwrap();
        }
        let stale = store.generation() - 1;
        let result = store.rewrite_group(&group, stale).await;
        assert!(matches!(
            result,
            Err(HiveError::Memory(MemoryError::ConsolidationConflict { .. }))
        ));
    }

    #[tokio::test]
    async fn test_export_then_import_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let source = store();
        let agent = new_agent_id();
        for (i, kind) in [MemoryType::Experience, MemoryType::Decision, MemoryType::Knowledge]
            .into_iter()
            .enumerate()
        {
            source
                .store(MemoryFragment::new(agent, "Engineer", format!("entry {i}"), kind, 0.5))
                .await
                .unwrap();
        }
        assert!(source.export(&path, Some(agent)).await.unwrap());

        let document: ExportDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(document.memory_count, 3);
        assert_eq!(document.agent_id, Some(agent));

        let target = MemoryStore::keyword_only(MemoryConfig::default());
        assert_eq!(target.import(&path).await.unwrap(), 3);

        let before = source.statistics().await.unwrap();
        let after = target.statistics().await.unwrap();
        assert_eq!(before.memory_types, after.memory_types);
        for original in source.scan(None).await.unwrap() {
            let copy = target.get(&original.id).await.unwrap().unwrap();
            assert_eq!(copy.content, original.content);
        }
    }

    #[tokio::test]
    async fn test_import_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let result = store().import(&path).await;
        assert!(matches!(
            result,
            Err(HiveError::Memory(MemoryError::Serialization { .. }))
        ));
    }
}
