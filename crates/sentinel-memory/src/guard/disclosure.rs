//! Fail-safe sanitization of payloads leaving the trust boundary.

use std::sync::Arc;

use crate::capabilities::Redactor;
use crate::config::GuardConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::metrics::METRICS;
use crate::obs;

use super::patterns::SensitivePattern;

/// Placeholder returned when redaction cannot be completed.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Sanitizes payloads through an injected [`Redactor`].
///
/// `sanitize` never errors and never returns the unredacted input: when the
/// redactor fails the configured placeholder is returned instead. The source
/// payload is only borrowed.
#[derive(Clone)]
pub struct DisclosureGuard {
    redactor: Arc<dyn Redactor>,
    patterns: Vec<SensitivePattern>,
    placeholder: serde_json::Value,
}

impl DisclosureGuard {
    /// Guard with explicit default patterns and the standard placeholder.
    pub fn new(redactor: Arc<dyn Redactor>, patterns: Vec<SensitivePattern>) -> Self {
        Self {
            redactor,
            patterns,
            placeholder: serde_json::Value::String(REDACTION_PLACEHOLDER.to_string()),
        }
    }

    /// Guard configured from a [`GuardConfig`].
    pub fn from_config(redactor: Arc<dyn Redactor>, config: &GuardConfig) -> MemoryResult<Self> {
        Ok(Self {
            redactor,
            patterns: config.patterns()?,
            placeholder: serde_json::Value::String(config.placeholder.clone()),
        })
    }

    /// Patterns applied by [`disclose`](Self::disclose).
    pub fn patterns(&self) -> &[SensitivePattern] {
        &self.patterns
    }

    /// Redact `payload` against `patterns`.
    pub async fn sanitize(
        &self,
        payload: &serde_json::Value,
        patterns: &[SensitivePattern],
    ) -> serde_json::Value {
        match self.redactor.redact(payload, patterns).await {
            Ok(redacted) => redacted,
            Err(err) => {
                let reason = MemoryError::RedactionFailed(err.to_string());
                METRICS.inc_redaction_fallbacks();
                obs::emit_redaction_fallback(&reason);
                self.placeholder.clone()
            }
        }
    }

    /// Redact `payload` against the guard's configured patterns.
    pub async fn disclose(&self, payload: &serde_json::Value) -> serde_json::Value {
        self.sanitize(payload, &self.patterns).await
    }
}
