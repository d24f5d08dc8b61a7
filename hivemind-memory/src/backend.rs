//! Memory backends
//!
//! [`VectorIndexBackend`] is the semantic backend: fragments live as a
//! document, a flat metadata map and an embedding, and queries rank by cosine
//! similarity. [`KeywordBackend`] is the in-process fallback keyed by id.

use crate::fragment::{by_importance_then_recency, FlatMetadata, MemoryFragment, MemoryQuery};
use async_trait::async_trait;
use hivemind_capabilities::EmbeddingProvider;
use hivemind_core::{AgentId, EmbeddingVector, FragmentId, HiveError, HiveResult, MemoryError, Timestamp};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Async memory backend trait.
///
/// Implementations own ranking for `search` and must apply every structured
/// filter of the query. `scan` and `get` never change access counters.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Label reported in statistics.
    fn label(&self) -> &str;

    /// Insert or overwrite a fragment keyed by its id.
    async fn upsert(&self, fragment: MemoryFragment) -> HiveResult<()>;

    /// Ranked, filtered, truncated search.
    async fn search(&self, query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>>;

    /// Point lookup.
    async fn get(&self, id: &str) -> HiveResult<Option<MemoryFragment>>;

    /// Delete by id. Returns whether a fragment was removed.
    async fn delete(&self, id: &str) -> HiveResult<bool>;

    /// Every fragment, optionally restricted to one owner, unranked.
    async fn scan(&self, agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>>;

    /// Record one read access on each id that still exists.
    async fn touch(&self, ids: &[FragmentId], at: Timestamp) -> HiveResult<()>;

    /// Number of stored fragments.
    async fn count(&self) -> HiveResult<usize>;
}

fn poisoned() -> HiveError {
    HiveError::Memory(MemoryError::LockPoisoned)
}

// ============================================================================
// KEYWORD BACKEND
// ============================================================================

/// In-process keyed map with substring search.
#[derive(Debug, Default)]
pub struct KeywordBackend {
    fragments: RwLock<HashMap<FragmentId, MemoryFragment>>,
}

impl KeywordBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for KeywordBackend {
    fn label(&self) -> &str {
        "keyword"
    }

    async fn upsert(&self, fragment: MemoryFragment) -> HiveResult<()> {
        let mut fragments = self.fragments.write().map_err(|_| poisoned())?;
        fragments.insert(fragment.id.clone(), fragment);
        Ok(())
    }

    async fn search(&self, query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
        let fragments = self.fragments.read().map_err(|_| poisoned())?;
        let mut results: Vec<MemoryFragment> = fragments
            .values()
            .filter(|f| query.admits(f) && query.matches_text(f))
            .cloned()
            .collect();
        drop(fragments);

        results.sort_by(by_importance_then_recency);
        results.truncate(query.max_results);
        Ok(results)
    }

    async fn get(&self, id: &str) -> HiveResult<Option<MemoryFragment>> {
        let fragments = self.fragments.read().map_err(|_| poisoned())?;
        Ok(fragments.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> HiveResult<bool> {
        let mut fragments = self.fragments.write().map_err(|_| poisoned())?;
        Ok(fragments.remove(id).is_some())
    }

    async fn scan(&self, agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
        let fragments = self.fragments.read().map_err(|_| poisoned())?;
        Ok(fragments
            .values()
            .filter(|f| agent_id.map_or(true, |id| f.agent_id == id))
            .cloned()
            .collect())
    }

    async fn touch(&self, ids: &[FragmentId], at: Timestamp) -> HiveResult<()> {
        let mut fragments = self.fragments.write().map_err(|_| poisoned())?;
        for id in ids {
            if let Some(fragment) = fragments.get_mut(id) {
                fragment.touch(at);
            }
        }
        Ok(())
    }

    async fn count(&self) -> HiveResult<usize> {
        Ok(self.fragments.read().map_err(|_| poisoned())?.len())
    }
}

// ============================================================================
// VECTOR INDEX BACKEND
// ============================================================================

/// One indexed record: the backend boundary format.
#[derive(Debug, Clone)]
struct IndexRecord {
    document: String,
    metadata: FlatMetadata,
    embedding: EmbeddingVector,
}

/// Embedding index with cosine-similarity search.
pub struct VectorIndexBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    records: RwLock<HashMap<FragmentId, IndexRecord>>,
}

impl VectorIndexBackend {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            records: RwLock::new(HashMap::new()),
        }
    }

    fn decode(id: &str, record: &IndexRecord) -> HiveResult<MemoryFragment> {
        MemoryFragment::from_metadata(
            id.to_string(),
            record.document.clone(),
            &record.metadata,
            Some(record.embedding.clone()),
        )
    }
}

impl std::fmt::Debug for VectorIndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndexBackend")
            .field("model", &self.embedder.model_id())
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

#[async_trait]
impl MemoryBackend for VectorIndexBackend {
    fn label(&self) -> &str {
        "vector"
    }

    async fn upsert(&self, fragment: MemoryFragment) -> HiveResult<()> {
        let embedding = match &fragment.embedding {
            Some(existing) if existing.dimensions() == self.embedder.dimensions() => existing.clone(),
            _ => self.embedder.embed(&fragment.content)?,
        };
        let record = IndexRecord {
            document: fragment.content.clone(),
            metadata: fragment.to_metadata(),
            embedding,
        };
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(fragment.id, record);
        Ok(())
    }

    async fn search(&self, query: &MemoryQuery) -> HiveResult<Vec<MemoryFragment>> {
        let text = query.query_text.trim();
        let query_embedding = if text.is_empty() {
            None
        } else {
            Some(self.embedder.embed(text)?)
        };

        let mut scored: Vec<(f32, MemoryFragment)> = Vec::new();
        {
            let records = self.records.read().map_err(|_| poisoned())?;
            for (id, record) in records.iter() {
                let fragment = Self::decode(id, record)?;
                if !query.admits(&fragment) {
                    continue;
                }
                let score = match &query_embedding {
                    Some(q) => q.cosine_similarity(&record.embedding).unwrap_or(0.0),
                    None => 0.0,
                };
                scored.push((score, fragment));
            }
        }

        scored.sort_by(|(sa, fa), (sb, fb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| by_importance_then_recency(fa, fb))
        });
        Ok(scored
            .into_iter()
            .take(query.max_results)
            .map(|(_, fragment)| fragment)
            .collect())
    }

    async fn get(&self, id: &str) -> HiveResult<Option<MemoryFragment>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        records.get(id).map(|r| Self::decode(id, r)).transpose()
    }

    async fn delete(&self, id: &str) -> HiveResult<bool> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records.remove(id).is_some())
    }

    async fn scan(&self, agent_id: Option<AgentId>) -> HiveResult<Vec<MemoryFragment>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut fragments = Vec::with_capacity(records.len());
        for (id, record) in records.iter() {
            let fragment = Self::decode(id, record)?;
            if agent_id.map_or(true, |owner| fragment.agent_id == owner) {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    async fn touch(&self, ids: &[FragmentId], at: Timestamp) -> HiveResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                let count: u32 = record
                    .metadata
                    .get("access_count")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                record
                    .metadata
                    .insert("access_count".to_string(), count.saturating_add(1).to_string());
                record
                    .metadata
                    .insert("last_accessed".to_string(), at.to_rfc3339());
            }
        }
        Ok(())
    }

    async fn count(&self) -> HiveResult<usize> {
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hivemind_capabilities::HashingEmbedder;
    use hivemind_core::{new_agent_id, MemoryType};

    fn fragment(content: &str, importance: f32) -> MemoryFragment {
        MemoryFragment::new(new_agent_id(), "Engineer", content, MemoryType::Experience, importance)
    }

    fn vector_backend() -> VectorIndexBackend {
        VectorIndexBackend::new(Arc::new(HashingEmbedder::new(128)))
    }

    #[tokio::test]
    async fn test_keyword_search_is_case_insensitive() {
        let backend = KeywordBackend::new();
        backend.upsert(fragment("Inverter sizing", 0.2)).await.unwrap();
        backend.upsert(fragment("Payback period", 0.9)).await.unwrap();

        let hits = backend.search(&MemoryQuery::new("INVERTER")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Inverter sizing");

        let all = backend.search(&MemoryQuery::new("")).await.unwrap();
        assert_eq!(all[0].content, "Payback period");
    }

    #[tokio::test]
    async fn test_keyword_upsert_overwrites() {
        let backend = KeywordBackend::new();
        let first = fragment("v1", 0.5);
        let second = first.clone();
        backend.upsert(first).await.unwrap();
        backend
            .upsert(MemoryFragment {
                content: "v2".to_string(),
                ..second
            })
            .await
            .unwrap();
        assert_eq!(backend.count().await.unwrap(), 1);
        let all = backend.scan(None).await.unwrap();
        assert_eq!(all[0].content, "v2");
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_similarity() {
        let backend = vector_backend();
        backend.upsert(fragment("grid impact analysis for feeder", 0.1)).await.unwrap();
        backend.upsert(fragment("financing options and roi", 0.9)).await.unwrap();

        let hits = backend
            .search(&MemoryQuery::new("grid impact").with_max_results(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.starts_with("grid impact"));
    }

    #[tokio::test]
    async fn test_vector_touch_updates_metadata() {
        let backend = vector_backend();
        let f = fragment("weather forecast", 0.5);
        let id = f.id.clone();
        backend.upsert(f).await.unwrap();
        let at = Utc::now();
        backend.touch(&[id.clone()], at).await.unwrap();
        backend.touch(&[id.clone()], at).await.unwrap();

        let stored = backend.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 2);
        assert!(stored.embedding.is_some());
    }

    #[tokio::test]
    async fn test_vector_scan_filters_owner_and_delete() {
        let backend = vector_backend();
        let mine = fragment("mine", 0.5);
        let owner = mine.agent_id;
        let id = mine.id.clone();
        backend.upsert(mine).await.unwrap();
        backend.upsert(fragment("theirs", 0.5)).await.unwrap();

        assert_eq!(backend.scan(Some(owner)).await.unwrap().len(), 1);
        assert!(backend.delete(&id).await.unwrap());
        assert!(!backend.delete(&id).await.unwrap());
        assert_eq!(backend.count().await.unwrap(), 1);
    }
}
