//! Tiered store adapter: one handle over working, episodic and procedural
//! memory.
//!
//! The adapter does not retry. Store errors are converted into
//! [`MemoryError`] with `NotFound` and `ConstraintViolation` kept intact;
//! callers own retry policy.

use std::sync::Arc;

use sentinel_state::fakes::{MemoryKeyValueStore, MemoryRelationalStore, MemoryVectorStore};
use sentinel_state::{
    CasBatch, EpisodeFilter, EpisodicRecord, KeyValueStore, RelationalStore, Row, ScoredEpisode,
    VectorStore, Versioned,
};

use crate::error::{MemoryError, MemoryResult};

/// Key prefix owned by the sync coordinator. No agent may use it as its id.
pub const SYNC_NAMESPACE: &str = "sync";

/// The three memory tiers behind shared trait objects.
#[derive(Clone)]
pub struct TieredStore {
    working: Arc<dyn KeyValueStore>,
    episodic: Arc<dyn VectorStore>,
    procedural: Arc<dyn RelationalStore>,
}

impl TieredStore {
    pub fn new(
        working: Arc<dyn KeyValueStore>,
        episodic: Arc<dyn VectorStore>,
        procedural: Arc<dyn RelationalStore>,
    ) -> Self {
        Self {
            working,
            episodic,
            procedural,
        }
    }

    /// All three tiers backed by the in-memory fakes.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(MemoryRelationalStore::new()),
        )
    }

    // -- working memory -----------------------------------------------------

    pub async fn get(&self, key: &str) -> MemoryResult<serde_json::Value> {
        Ok(self.working.get(key).await?)
    }

    pub async fn set(&self, key: &str, value: serde_json::Value) -> MemoryResult<()> {
        Ok(self.working.set(key, value).await?)
    }

    pub async fn get_versioned(
        &self,
        key: &str,
    ) -> MemoryResult<Option<Versioned<serde_json::Value>>> {
        Ok(self.working.get_versioned(key).await?)
    }

    /// Atomic multi-key compare-and-swap. A lost race surfaces as
    /// `MemoryError::Storage(StorageError::VersionConflict { .. })`.
    pub async fn compare_and_swap(&self, batch: CasBatch) -> MemoryResult<()> {
        Ok(self.working.compare_and_swap(batch).await?)
    }

    /// Handle restricted to one agent's working-memory keys.
    pub fn namespace(&self, agent_id: &str) -> MemoryResult<WorkingNamespace> {
        WorkingNamespace::new(self.clone(), agent_id)
    }

    // -- episodic memory ----------------------------------------------------

    /// Nearest-neighbour query, best match first.
    pub async fn query(
        &self,
        vector: &[f32],
        filter: &EpisodeFilter,
    ) -> MemoryResult<Vec<ScoredEpisode>> {
        Ok(self.episodic.query(vector, filter).await?)
    }

    pub async fn store_episode(&self, record: EpisodicRecord) -> MemoryResult<()> {
        Ok(self.episodic.store(record).await?)
    }

    // -- procedural memory --------------------------------------------------

    /// Run a mutating statement; returns the number of affected rows.
    pub async fn execute(&self, statement: &str, params: &[serde_json::Value]) -> MemoryResult<u64> {
        Ok(self.procedural.execute(statement, params).await?)
    }

    pub async fn query_rows(
        &self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> MemoryResult<Vec<Row>> {
        Ok(self.procedural.query(statement, params).await?)
    }
}

/// Working-memory view owned by a single agent.
///
/// Keys are `"{agent_id}:{scope}"`. Agent ids may not contain `:`, so the
/// prefix before the first `:` always names the owner and one namespace can
/// never reach another agent's keys.
#[derive(Clone)]
pub struct WorkingNamespace {
    store: TieredStore,
    agent_id: String,
}

impl WorkingNamespace {
    pub fn new(store: TieredStore, agent_id: &str) -> MemoryResult<Self> {
        if agent_id.is_empty() || agent_id.contains(':') {
            return Err(MemoryError::InvalidConfig(format!(
                "invalid agent id {agent_id:?}: must be non-empty and contain no ':'"
            )));
        }
        if agent_id == SYNC_NAMESPACE {
            return Err(MemoryError::InvalidConfig(format!(
                "agent id {agent_id:?} is reserved for sync state"
            )));
        }
        Ok(Self {
            store,
            agent_id: agent_id.to_string(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Fully qualified key for `scope`.
    pub fn key(&self, scope: &str) -> String {
        format!("{}:{}", self.agent_id, scope)
    }

    pub async fn get(&self, scope: &str) -> MemoryResult<serde_json::Value> {
        self.store.get(&self.key(scope)).await
    }

    pub async fn set(&self, scope: &str, value: serde_json::Value) -> MemoryResult<()> {
        self.store.set(&self.key(scope), value).await
    }

    pub async fn get_versioned(
        &self,
        scope: &str,
    ) -> MemoryResult<Option<Versioned<serde_json::Value>>> {
        self.store.get_versioned(&self.key(scope)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_namespace_prefixes_keys() {
        let store = TieredStore::in_memory();
        let ns = store.namespace("analyst").unwrap();
        ns.set("contract:0xABC", json!(1)).await.unwrap();

        assert_eq!(store.get("analyst:contract:0xABC").await.unwrap(), json!(1));
        assert_eq!(ns.get("contract:0xABC").await.unwrap(), json!(1));
    }

    #[test]
    fn test_namespace_rejects_ambiguous_agent_ids() {
        let store = TieredStore::in_memory();
        assert!(matches!(
            store.namespace("a:b"),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(store.namespace("").is_err());
    }

    #[test]
    fn test_namespace_rejects_reserved_sync_id() {
        let store = TieredStore::in_memory();
        assert!(matches!(
            store.namespace(SYNC_NAMESPACE),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(store.namespace("syncer").is_ok());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = TieredStore::in_memory();
        let a = store.namespace("a").unwrap();
        let b = store.namespace("b").unwrap();
        a.set("context", json!(["x"])).await.unwrap();

        assert!(matches!(
            b.get("context").await,
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = TieredStore::in_memory();
        let err = store.get("nobody:context").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
