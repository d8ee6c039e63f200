//! Sentinel Memory: tiered memory policy layer for autonomous analysis agents.
//!
//! Sits on the three stores from `sentinel-state` and decides what moves
//! between tiers, when, and under which consistency and latency bounds:
//!
//! - [`context`]  — bounded per-agent context windows, compacted into
//!   episodic summaries
//! - [`sync`]     — optimistic-concurrency sync cycles with retries, budgets
//!   and pub/sub deltas
//! - [`guard`]    — integrity proofs over memory roots, fail-safe redaction
//! - [`facade`]   — security-analyst and threat-intel profiles
//!
//! External vendors (embedding, summarization, redaction, proving, pub/sub)
//! are reached only through [`capabilities`].

pub mod capabilities;
pub mod config;
pub mod context;
pub mod error;
pub mod facade;
pub mod fakes;
pub mod guard;
pub mod metrics;
pub mod obs;
pub mod sync;
pub mod telemetry;
pub mod tiered;

pub use capabilities::{
    CapabilityError, CapabilityResult, CompactSummary, Embedder, Prover, PubSub, Redactor,
    Summarizer,
};
pub use config::{
    ContextConfig, CustomPattern, GuardConfig, MemoryConfig, SyncPolicy, SyncStrategy,
    CONTEXT_SUMMARY_CATEGORY, MEMORY_SYNC_TOPIC,
};
pub use context::{AppendOutcome, ContextWindowManager, WindowState, CONTEXT_SCOPE};
pub use error::{MemoryError, MemoryResult};
pub use facade::{
    AgentMemory, ContractAnalysisState, ExploitRecorded, SecurityAnalystMemory,
    ThreatIntelMemory, EXPLOIT_UPDATE, THREAT_INTEL_TOPIC, VULNERABILITY_CATEGORY,
};
pub use guard::{
    DisclosureGuard, IntegrityGuard, MemoryRoot, Proof, RegexRedactor, SensitivePattern,
    MEMORY_INTEGRITY_STATEMENT, REDACTION_PLACEHOLDER,
};
pub use sync::{
    MergeQueueTask, SyncCoordinator, SyncReport, SyncTask, SyncTaskSet, SyncTransaction,
    TaskOutcome, TaskStatus,
};
pub use tiered::{TieredStore, WorkingNamespace, SYNC_NAMESPACE};

pub use sentinel_state::{
    EpisodeFilter, EpisodicRecord, EventRecord, ProceduralRecord, ScoredEpisode, StorageError,
};

/// Crate version, as recorded in Cargo metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
