//! Agent memory façades: domain profiles composed from the tiered store,
//! the context window manager and the guards.
//!
//! - [`AgentMemory`]            — shared core owned by every profile
//! - [`SecurityAnalystMemory`]  — contract analysis state, vulnerability recall
//! - [`ThreatIntelMemory`]      — known exploits in procedural memory

pub mod security_analyst;
pub mod threat_intel;

use std::sync::Arc;

use sentinel_state::EventRecord;
use tracing::Instrument;

use crate::context::{AppendOutcome, ContextWindowManager};
use crate::error::MemoryResult;
use crate::guard::{DisclosureGuard, IntegrityGuard, MemoryRoot, Proof};
use crate::obs;
use crate::tiered::{TieredStore, WorkingNamespace};

pub use security_analyst::{ContractAnalysisState, SecurityAnalystMemory, VULNERABILITY_CATEGORY};
pub use threat_intel::{ExploitRecorded, ThreatIntelMemory, EXPLOIT_UPDATE, THREAT_INTEL_TOPIC};

/// The parts every agent profile shares.
///
/// Owns exactly one working-memory namespace; episodic and procedural tiers
/// are reached through the shared [`TieredStore`].
#[derive(Clone)]
pub struct AgentMemory {
    namespace: WorkingNamespace,
    store: TieredStore,
    context: Arc<ContextWindowManager>,
    disclosure: DisclosureGuard,
}

impl AgentMemory {
    pub fn new(
        agent_id: &str,
        store: TieredStore,
        context: Arc<ContextWindowManager>,
        disclosure: DisclosureGuard,
    ) -> MemoryResult<Self> {
        Ok(Self {
            namespace: store.namespace(agent_id)?,
            store,
            context,
            disclosure,
        })
    }

    pub fn agent_id(&self) -> &str {
        self.namespace.agent_id()
    }

    pub fn namespace(&self) -> &WorkingNamespace {
        &self.namespace
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    /// Append an observation to this agent's context window.
    pub async fn observe<I, S>(&self, payload: serde_json::Value, tags: I) -> MemoryResult<AppendOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = EventRecord::new(payload).with_tags(tags);
        self.context
            .append(self.agent_id(), record)
            .instrument(obs::agent_span(self.agent_id()))
            .await
    }

    /// Current context window, oldest first.
    pub async fn context(&self) -> MemoryResult<Vec<EventRecord>> {
        self.context.window(self.agent_id()).await
    }

    /// Sanitize `payload` for release outside the trust boundary.
    pub async fn disclose(&self, payload: &serde_json::Value) -> serde_json::Value {
        self.disclosure.disclose(payload).await
    }

    /// Sanitized copy of the context window.
    pub async fn disclose_context(&self) -> MemoryResult<serde_json::Value> {
        let window = serde_json::to_value(self.context().await?)?;
        Ok(self.disclose(&window).await)
    }

    /// Root of the current context window.
    pub async fn context_root(&self) -> MemoryResult<MemoryRoot> {
        MemoryRoot::from_window(&self.context().await?)
    }

    /// Prove the current context window's root.
    pub async fn attest_context(&self, integrity: &IntegrityGuard) -> MemoryResult<Proof> {
        let root = self.context_root().await?;
        integrity.prove_integrity(&root).await
    }
}
