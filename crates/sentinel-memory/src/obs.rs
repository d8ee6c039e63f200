//! Structured observability hooks for memory lifecycle events.
//!
//! This module provides:
//! - Agent-scoped tracing spans via [`agent_span`]
//! - Emission functions for key events: window append, compaction, sync task
//!   commit/retry/failure, cycle completion, exploit recording, publish
//!   failures, redaction fallbacks and proofs
//!
//! Events are emitted at `info!` level unless noted (configurable via
//! `RUST_LOG`). For JSON output, pass `json = true` to
//! [`crate::telemetry::init_tracing`].

use tracing::{debug, info, warn};

/// Span tagging everything inside it with `agent_id`.
///
/// Attach to futures with `tracing::Instrument`:
///
/// ```ignore
/// manager.append(agent, record).instrument(obs::agent_span(agent)).await
/// ```
pub fn agent_span(agent_id: &str) -> tracing::Span {
    tracing::info_span!("sentinel.agent", agent_id = %agent_id)
}

/// Emit event: a record was appended to an agent's context window (debug level).
pub fn emit_window_appended(agent_id: &str, window_len: usize) {
    debug!(event = "context.appended", agent_id = %agent_id, window_len = window_len);
}

/// Emit event: oldest records were compacted into an episodic summary.
pub fn emit_context_compacted(agent_id: &str, summarized: usize, summary_id: &str) {
    info!(
        event = "context.compacted",
        agent_id = %agent_id,
        summarized = summarized,
        summary_id = %summary_id,
    );
}

/// Emit event: compaction aborted; the window was left untouched (warn level).
pub fn emit_compaction_aborted(agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "context.compaction_aborted", agent_id = %agent_id, error = %error);
}

/// Emit event: a sync task committed its writes.
pub fn emit_sync_task_committed(task: &str, attempts: u32) {
    info!(event = "sync.task_committed", task = %task, attempts = attempts);
}

/// Emit event: a sync task hit a version conflict and will retry (debug level).
pub fn emit_sync_task_retry(task: &str, attempt: u32, key: &str) {
    debug!(event = "sync.task_retry", task = %task, attempt = attempt, key = %key);
}

/// Emit event: a sync task failed; siblings are unaffected (warn level).
pub fn emit_sync_task_failed(task: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "sync.task_failed", task = %task, kind = %kind, error = %error);
}

/// Emit event: a sync cycle finished.
pub fn emit_sync_cycle_finished(committed: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "sync.cycle_finished",
        committed = committed,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: a pub/sub publish failed after the underlying write succeeded (warn level).
pub fn emit_publish_failed(topic: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pubsub.publish_failed", topic = %topic, error = %error);
}

/// Emit event: an exploit was inserted into procedural memory.
pub fn emit_exploit_recorded(exploit_id: &str, published: bool) {
    info!(event = "threat_intel.exploit_recorded", exploit_id = %exploit_id, published = published);
}

/// Emit event: redaction failed and the placeholder was disclosed instead (warn level).
pub fn emit_redaction_fallback(error: &dyn std::fmt::Display) {
    warn!(event = "guard.redaction_fallback", error = %error);
}

/// Emit event: an integrity proof was produced.
pub fn emit_proof_produced(root_short: &str, proof_len: usize) {
    info!(event = "guard.proof_produced", root = %root_short, proof_len = proof_len);
}
