//! External capabilities consumed by the policy layer.
//!
//! Embedding, summarization, redaction, proving and pub/sub fan-out are
//! vendor concerns. The core only sees these traits; deterministic fakes live
//! in [`crate::fakes`].

use async_trait::async_trait;
use sentinel_state::EventRecord;
use serde::{Deserialize, Serialize};

use crate::guard::SensitivePattern;

/// Errors returned by an external capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("{capability} unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    #[error("{capability} failed: {reason}")]
    Failed { capability: String, reason: String },
}

impl CapabilityError {
    pub fn failed(capability: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(capability: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Output of a summarization call: one compact record standing in for many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactSummary {
    pub text: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Text embedding. Must be deterministic for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>>;
}

/// Compresses a run of working-memory records into one summary. May fail.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, records: &[EventRecord]) -> CapabilityResult<CompactSummary>;
}

/// Masks sensitive content in a payload. Must not mutate its input.
#[async_trait]
pub trait Redactor: Send + Sync {
    async fn redact(
        &self,
        payload: &serde_json::Value,
        patterns: &[SensitivePattern],
    ) -> CapabilityResult<serde_json::Value>;
}

/// Zero-knowledge style proving backend. May fail.
#[async_trait]
pub trait Prover: Send + Sync {
    /// Produce a proof for `statement` over `witness`.
    async fn prove(&self, statement: &str, witness: &[u8]) -> CapabilityResult<Vec<u8>>;

    /// Check a proof previously produced for `statement` and `witness`.
    async fn verify(&self, statement: &str, witness: &[u8], proof: &[u8])
        -> CapabilityResult<bool>;
}

/// Fire-and-forget fan-out channel shared by agents.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, message: serde_json::Value) -> CapabilityResult<()>;
}
