//! Deterministic capability fakes for tests and the in-memory daemon.
//!
//! Every fake is reproducible for identical input and supports failure
//! injection where the real capability "may fail".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sentinel_state::EventRecord;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::capabilities::{
    CapabilityError, CapabilityResult, CompactSummary, Embedder, Prover, PubSub, Redactor,
    Summarizer,
};
use crate::guard::SensitivePattern;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// HashEmbedder
// ---------------------------------------------------------------------------

/// Embeds text by expanding its SHA-256 digest into a unit vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 16;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The embedding of `text`, computed synchronously.
    pub fn vector_of(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut block: u32 = 0;
        while values.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(2) {
                if values.len() == self.dimensions {
                    break;
                }
                let raw = u16::from_le_bytes([chunk[0], chunk[1]]);
                values.push(raw as f32 / u16::MAX as f32 * 2.0 - 1.0);
            }
            block += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        values
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        Ok(self.vector_of(text))
    }
}

// ---------------------------------------------------------------------------
// JoinSummarizer
// ---------------------------------------------------------------------------

/// Summarizes by joining the compact JSON of each payload with `" | "`.
#[derive(Debug, Default)]
pub struct JoinSummarizer {
    failing: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl JoinSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        let summarizer = Self::default();
        summarizer.set_failing(true);
        summarizer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `summarize` calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for JoinSummarizer {
    async fn summarize(&self, records: &[EventRecord]) -> CapabilityResult<CompactSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable(
                "summarizer",
                "injected failure",
            ));
        }

        let text = records
            .iter()
            .map(|r| r.payload.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        let tags: Vec<&String> = records.iter().flat_map(|r| r.tags.iter()).collect();
        Ok(CompactSummary {
            text,
            details: serde_json::json!({ "tags": tags }),
        })
    }
}

// ---------------------------------------------------------------------------
// DigestProver
// ---------------------------------------------------------------------------

/// Proves by hashing `statement || 0x00 || witness` with SHA-256.
#[derive(Debug, Default)]
pub struct DigestProver {
    failing: AtomicBool,
}

impl DigestProver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let prover = Self::default();
        prover.set_failing(true);
        prover
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn digest(statement: &str, witness: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(statement.as_bytes());
        hasher.update([0u8]);
        hasher.update(witness);
        hasher.finalize().to_vec()
    }
}

#[async_trait]
impl Prover for DigestProver {
    async fn prove(&self, statement: &str, witness: &[u8]) -> CapabilityResult<Vec<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::failed("prover", "injected failure"));
        }
        Ok(Self::digest(statement, witness))
    }

    async fn verify(
        &self,
        statement: &str,
        witness: &[u8],
        proof: &[u8],
    ) -> CapabilityResult<bool> {
        Ok(Self::digest(statement, witness) == proof)
    }
}

// ---------------------------------------------------------------------------
// MemoryPubSub
// ---------------------------------------------------------------------------

/// A published `(topic, message)` pair.
pub type Published = (String, serde_json::Value);

/// In-process pub/sub that keeps the most recent messages and fans out over
/// a `tokio::sync::broadcast` channel.
pub struct MemoryPubSub {
    sent: Mutex<VecDeque<Published>>,
    history_limit: usize,
    sender: broadcast::Sender<Published>,
    failing: AtomicBool,
}

impl MemoryPubSub {
    /// Messages retained for [`messages`](Self::messages) by default.
    pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sent: Mutex::new(VecDeque::new()),
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
            sender,
            failing: AtomicBool::new(false),
        }
    }

    /// Retain at most `limit` messages; older ones are dropped first.
    /// Zero keeps no history, leaving broadcast as the only delivery.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> Vec<Published> {
        lock(&self.sent).iter().cloned().collect()
    }

    /// Retained messages on `topic`, oldest first.
    pub fn messages_on(&self, topic: &str) -> Vec<serde_json::Value> {
        lock(&self.sent)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, topic: &str, message: serde_json::Value) -> CapabilityResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable("pubsub", "injected failure"));
        }
        if self.history_limit > 0 {
            let mut sent = lock(&self.sent);
            while sent.len() >= self.history_limit {
                sent.pop_front();
            }
            sent.push_back((topic.to_string(), message.clone()));
        }
        // No subscribers is not an error for fire-and-forget delivery.
        let _ = self.sender.send((topic.to_string(), message));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingRedactor
// ---------------------------------------------------------------------------

/// A redactor that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRedactor;

#[async_trait]
impl Redactor for FailingRedactor {
    async fn redact(
        &self,
        _payload: &serde_json::Value,
        _patterns: &[SensitivePattern],
    ) -> CapabilityResult<serde_json::Value> {
        Err(CapabilityError::failed("redactor", "injected failure"))
    }
}
