//! Security-analyst profile: per-contract analysis state in working memory
//! and vulnerability recall from episodic memory.

use std::sync::Arc;

use sentinel_state::{CasBatch, EpisodeFilter, EpisodicRecord, ScoredEpisode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AgentMemory;
use crate::capabilities::Embedder;
use crate::error::{MemoryError, MemoryResult};

/// Episodic category for vulnerability episodes.
pub const VULNERABILITY_CATEGORY: &str = "vulnerability";

/// Re-reads allowed when concurrent progress updates keep racing.
const MAX_PROGRESS_ATTEMPTS: u32 = 64;

/// Analysis state cached per contract address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractAnalysisState {
    pub vulnerabilities: Vec<serde_json::Value>,
    pub current_line: u64,
    pub scan_progress: f64,
}

pub struct SecurityAnalystMemory {
    core: AgentMemory,
    embedder: Arc<dyn Embedder>,
}

impl SecurityAnalystMemory {
    pub fn new(core: AgentMemory, embedder: Arc<dyn Embedder>) -> Self {
        Self { core, embedder }
    }

    pub fn core(&self) -> &AgentMemory {
        &self.core
    }

    fn contract_scope(address: &str) -> String {
        format!("contract:{address}")
    }

    /// Overwrite the analysis state for `address` with a fresh one.
    ///
    /// Prior vulnerabilities and progress for the address are discarded.
    pub async fn cache_contract_context(&self, address: &str) -> MemoryResult<ContractAnalysisState> {
        let state = ContractAnalysisState::default();
        self.core
            .namespace()
            .set(&Self::contract_scope(address), serde_json::to_value(&state)?)
            .await?;
        debug!(agent_id = %self.core.agent_id(), address = %address, "contract context cached");
        Ok(state)
    }

    /// Cached analysis state, or `NotFound` if never cached.
    pub async fn contract_context(&self, address: &str) -> MemoryResult<ContractAnalysisState> {
        let value = self
            .core
            .namespace()
            .get(&Self::contract_scope(address))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Advance the scan for `address`, optionally recording a finding.
    ///
    /// The update is a compare-and-swap against the version read, re-read on
    /// conflict, so concurrent updates for one address never drop a finding.
    pub async fn update_scan_progress(
        &self,
        address: &str,
        current_line: u64,
        scan_progress: f64,
        finding: Option<serde_json::Value>,
    ) -> MemoryResult<ContractAnalysisState> {
        if !(0.0..=1.0).contains(&scan_progress) {
            return Err(MemoryError::InvalidArgument(format!(
                "scan_progress must be within [0, 1], got {scan_progress}"
            )));
        }
        let scope = Self::contract_scope(address);
        let key = self.core.namespace().key(&scope);

        for attempt in 1..=MAX_PROGRESS_ATTEMPTS {
            let current = self
                .core
                .namespace()
                .get_versioned(&scope)
                .await?
                .ok_or_else(|| MemoryError::NotFound { key: key.clone() })?;
            let mut state: ContractAnalysisState = serde_json::from_value(current.value)?;
            state.current_line = current_line;
            state.scan_progress = scan_progress;
            state.vulnerabilities.extend(finding.iter().cloned());

            let batch = CasBatch::new()
                .expect(key.clone(), current.version)
                .write(key.clone(), serde_json::to_value(&state)?);
            match self.core.store().compare_and_swap(batch).await {
                Ok(()) => return Ok(state),
                Err(MemoryError::Storage(err)) if err.is_conflict() => {
                    debug!(address = %address, attempt, "scan progress raced, re-reading");
                }
                Err(err) => return Err(err),
            }
        }

        Err(MemoryError::ConflictRetryExhausted {
            task: format!("update_scan_progress {address}"),
            attempts: MAX_PROGRESS_ATTEMPTS,
        })
    }

    /// Store a vulnerability episode keyed by the embedding of its type.
    /// Returns the episode id.
    pub async fn remember_vulnerability(
        &self,
        vuln_type: &str,
        details: serde_json::Value,
    ) -> MemoryResult<String> {
        let embedding = self.embedder.embed(vuln_type).await?;
        let record = EpisodicRecord::new(
            embedding,
            VULNERABILITY_CATEGORY,
            serde_json::json!({
                "type": vuln_type,
                "details": details,
                "agent_id": self.core.agent_id(),
            }),
        );
        let id = record.id.clone();
        self.core.store().store_episode(record).await?;
        Ok(id)
    }

    /// Vulnerability episodes most similar to `vuln_type`, best first.
    pub async fn recall_similar_vulnerability(
        &self,
        vuln_type: &str,
        limit: usize,
    ) -> MemoryResult<Vec<ScoredEpisode>> {
        let embedding = self.embedder.embed(vuln_type).await?;
        let filter = EpisodeFilter::all()
            .with_category(VULNERABILITY_CATEGORY)
            .with_limit(limit);
        self.core.store().query(&embedding, &filter).await
    }

    /// Sanitized analysis state for release outside the trust boundary.
    pub async fn disclose_contract_context(&self, address: &str) -> MemoryResult<serde_json::Value> {
        let state = serde_json::to_value(self.contract_context(address).await?)?;
        Ok(self.core.disclose(&state).await)
    }
}
