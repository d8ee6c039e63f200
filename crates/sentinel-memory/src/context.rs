//! Rolling context window per agent with compaction into episodic memory.
//!
//! Each agent's window lives in working memory under `"{agent}:context"`.
//! Appends for one agent are linearized by a per-agent async mutex. When an
//! append would push the window past `max_size`, the oldest
//! `compress_threshold` records are summarized, embedded and stored as one
//! episodic record per chunk before the shrunk window is written back.
//!
//! Compaction is all-or-nothing: every summary and embedding is computed
//! before the first write, so a failing capability or an expired deadline
//! leaves both tiers untouched. Summary ids are derived from the agent and
//! the compacted records, and the episodic store ignores a repeated id, so
//! retrying an append whose window write failed reuses the stored summary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sentinel_state::{EpisodicRecord, EventRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::capabilities::{Embedder, Summarizer};
use crate::config::ContextConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::tiered::{TieredStore, WorkingNamespace};

/// Working-memory scope holding the window.
pub const CONTEXT_SCOPE: &str = "context";

/// Observable lifecycle of one agent's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Idle,
    Appending,
    Compacting,
}

/// Result of a settled append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    /// Window length after the append.
    pub window_len: usize,
    /// Number of records moved into episodic memory.
    pub compacted: usize,
    /// Ids of the episodic summaries written, oldest chunk first.
    pub summary_ids: Vec<String>,
}

struct AgentSlot {
    append_lock: tokio::sync::Mutex<()>,
    state: Mutex<WindowState>,
}

impl AgentSlot {
    fn new() -> Self {
        Self {
            append_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(WindowState::Idle),
        }
    }

    fn set_state(&self, state: WindowState) {
        *lock(&self.state) = state;
    }
}

/// Resets the slot to `Idle` on drop, including on error or cancellation.
struct StateGuard<'a>(&'a AgentSlot);

impl<'a> StateGuard<'a> {
    fn enter(slot: &'a AgentSlot) -> Self {
        slot.set_state(WindowState::Appending);
        Self(slot)
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.0.set_state(WindowState::Idle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maintains bounded per-agent context windows.
pub struct ContextWindowManager {
    store: TieredStore,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    config: ContextConfig,
    agents: Mutex<HashMap<String, Arc<AgentSlot>>>,
}

impl ContextWindowManager {
    /// Fails with `InvalidConfig` unless `0 < compress_threshold < max_size`.
    pub fn new(
        store: TieredStore,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        config: ContextConfig,
    ) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            summarizer,
            embedder,
            config,
            agents: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Append `record` to the agent's window, compacting first if needed.
    pub async fn append(&self, agent_id: &str, record: EventRecord) -> MemoryResult<AppendOutcome> {
        self.append_inner(agent_id, record, None).await
    }

    /// Like [`append`](Self::append), but summarization and embedding must
    /// finish within `deadline` or the append fails with `TimeoutExceeded`
    /// and nothing is written.
    pub async fn append_with_deadline(
        &self,
        agent_id: &str,
        record: EventRecord,
        deadline: Duration,
    ) -> MemoryResult<AppendOutcome> {
        self.append_inner(agent_id, record, Some(deadline)).await
    }

    /// Current window, oldest first. Empty if the agent never appended.
    pub async fn window(&self, agent_id: &str) -> MemoryResult<Vec<EventRecord>> {
        let ns = self.store.namespace(agent_id)?;
        read_window(&ns).await
    }

    pub fn state(&self, agent_id: &str) -> WindowState {
        lock(&self.agents)
            .get(agent_id)
            .map(|slot| *lock(&slot.state))
            .unwrap_or(WindowState::Idle)
    }

    fn slot(&self, agent_id: &str) -> Arc<AgentSlot> {
        let mut agents = lock(&self.agents);
        Arc::clone(
            agents
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(AgentSlot::new())),
        )
    }

    async fn append_inner(
        &self,
        agent_id: &str,
        record: EventRecord,
        deadline: Option<Duration>,
    ) -> MemoryResult<AppendOutcome> {
        let ns = self.store.namespace(agent_id)?;
        let slot = self.slot(agent_id);
        let _serial = slot.append_lock.lock().await;
        let _state = StateGuard::enter(&slot);

        let mut window = read_window(&ns).await?;
        let mut chunks: Vec<Vec<EventRecord>> = Vec::new();
        while window.len() + 1 > self.config.max_size {
            let take = self.config.compress_threshold.min(window.len());
            chunks.push(window.drain(..take).collect());
        }

        let mut summary_ids = Vec::with_capacity(chunks.len());
        let compacted: usize = chunks.iter().map(Vec::len).sum();
        if !chunks.is_empty() {
            slot.set_state(WindowState::Compacting);
            let episodes = match self.prepare_summaries(agent_id, &chunks, deadline).await {
                Ok(episodes) => episodes,
                Err(err) => {
                    obs::emit_compaction_aborted(agent_id, &err);
                    return Err(err);
                }
            };
            for episode in episodes {
                summary_ids.push(episode.id.clone());
                self.store.store_episode(episode).await?;
            }
        }

        window.push(record);
        ns.set(CONTEXT_SCOPE, serde_json::to_value(&window)?).await?;

        METRICS.inc_appends();
        if compacted > 0 {
            METRICS.inc_compactions();
            for id in &summary_ids {
                obs::emit_context_compacted(agent_id, compacted, id);
            }
        }
        obs::emit_window_appended(agent_id, window.len());

        Ok(AppendOutcome {
            window_len: window.len(),
            compacted,
            summary_ids,
        })
    }

    async fn prepare_summaries(
        &self,
        agent_id: &str,
        chunks: &[Vec<EventRecord>],
        deadline: Option<Duration>,
    ) -> MemoryResult<Vec<EpisodicRecord>> {
        let work = self.summarize_chunks(agent_id, chunks);
        match deadline {
            None => work.await,
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                MemoryError::TimeoutExceeded {
                    operation: format!("context compaction for {agent_id}"),
                    budget_ms: limit.as_millis() as u64,
                }
            })?,
        }
    }

    async fn summarize_chunks(
        &self,
        agent_id: &str,
        chunks: &[Vec<EventRecord>],
    ) -> MemoryResult<Vec<EpisodicRecord>> {
        let mut episodes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let summary = self
                .summarizer
                .summarize(chunk)
                .await
                .map_err(|e| MemoryError::CompactionFailed(e.to_string()))?;
            let embedding = self
                .embedder
                .embed(&summary.text)
                .await
                .map_err(|e| MemoryError::CompactionFailed(e.to_string()))?;

            let mut payload = serde_json::json!({
                "agent_id": agent_id,
                "summary": summary.text,
                "record_count": chunk.len(),
                "first_timestamp": chunk.first().map(|r| r.timestamp),
                "last_timestamp": chunk.last().map(|r| r.timestamp),
            });
            if !summary.details.is_null() {
                payload["details"] = summary.details;
            }
            debug!(agent_id = %agent_id, records = chunk.len(), "chunk summarized");
            episodes.push(
                EpisodicRecord::new(embedding, &self.config.summary_category, payload)
                    .with_id(summary_id(agent_id, chunk)?),
            );
        }
        Ok(episodes)
    }
}

/// Content address of one compacted chunk.
fn summary_id(agent_id: &str, chunk: &[EventRecord]) -> MemoryResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(agent_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(chunk)?);
    Ok(hex::encode(hasher.finalize()))
}

async fn read_window(ns: &WorkingNamespace) -> MemoryResult<Vec<EventRecord>> {
    match ns.get(CONTEXT_SCOPE).await {
        Ok(value) => Ok(serde_json::from_value(value)?),
        Err(MemoryError::NotFound { .. }) => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}
