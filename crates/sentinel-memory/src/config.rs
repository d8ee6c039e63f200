//! Configuration for the memory policy layer.
//!
//! Loaded from TOML. Every section has defaults, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! [context]
//! max_size = 20
//! compress_threshold = 10
//!
//! [sync]
//! strategy = "optimistic_concurrency"
//! latency_budget_ms = 300
//! max_retries = 3
//!
//! [guard]
//! sensitive_patterns = ["private_keys", "security_credentials", "sensitive_addresses"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::guard::SensitivePattern;

/// Default episodic category for compaction summaries.
pub const CONTEXT_SUMMARY_CATEGORY: &str = "context_summary";

/// Default pub/sub topic for sync deltas.
pub const MEMORY_SYNC_TOPIC: &str = "memory_sync";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub context: ContextConfig,
    pub sync: SyncPolicy,
    pub guard: GuardConfig,
}

impl MemoryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| MemoryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> MemoryResult<Self> {
        let input = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> MemoryResult<()> {
        self.context.validate()?;
        self.sync.validate()?;
        self.guard.patterns()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Context window
// ---------------------------------------------------------------------------

/// Bounds for the rolling context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of records held in the window after any append.
    pub max_size: usize,
    /// Number of oldest records summarized per compaction.
    pub compress_threshold: usize,
    /// Episodic category assigned to compaction summaries.
    pub summary_category: String,
}

impl ContextConfig {
    /// Build a validated config. Fails unless `0 < compress_threshold < max_size`.
    pub fn new(max_size: usize, compress_threshold: usize) -> MemoryResult<Self> {
        let config = Self {
            max_size,
            compress_threshold,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.compress_threshold == 0 {
            return Err(MemoryError::InvalidConfig(
                "compress_threshold must be greater than zero".to_string(),
            ));
        }
        if self.compress_threshold >= self.max_size {
            return Err(MemoryError::InvalidConfig(format!(
                "compress_threshold ({}) must be less than max_size ({})",
                self.compress_threshold, self.max_size
            )));
        }
        if self.summary_category.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "summary_category must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            compress_threshold: 10,
            summary_category: CONTEXT_SUMMARY_CATEGORY.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// How tasks within one sync cycle are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Run every task concurrently; conflicts are detected at commit.
    OptimisticConcurrency,
    /// Run tasks one after another in declaration order.
    Sequential,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OptimisticConcurrency => write!(f, "optimistic_concurrency"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// Latency and retry policy injected into the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    pub strategy: SyncStrategy,
    /// Upper bound on one task's total wall-clock time, retries included.
    pub latency_budget_ms: u64,
    /// Retries after a version conflict (0 = single attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub backoff_base_ms: u64,
    /// Topic that committed deltas are published on.
    pub topic: String,
}

impl SyncPolicy {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.latency_budget_ms == 0 {
            return Err(MemoryError::InvalidConfig(
                "latency_budget_ms must be greater than zero".to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "sync topic must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::OptimisticConcurrency,
            latency_budget_ms: 300,
            max_retries: 3,
            backoff_base_ms: 10,
            topic: MEMORY_SYNC_TOPIC.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity & disclosure
// ---------------------------------------------------------------------------

/// A user-supplied sensitive pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPattern {
    pub name: String,
    pub regex: String,
}

/// Settings for the integrity and disclosure guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Built-in pattern identifiers applied on disclosure.
    pub sensitive_patterns: Vec<String>,
    pub custom_patterns: Vec<CustomPattern>,
    /// Payload returned when redaction itself fails.
    pub placeholder: String,
    /// Statement proven by the integrity guard.
    pub proof_statement: String,
}

impl GuardConfig {
    /// Resolve identifiers and custom regexes into patterns.
    pub fn patterns(&self) -> MemoryResult<Vec<SensitivePattern>> {
        let mut patterns = self
            .sensitive_patterns
            .iter()
            .map(|id| id.parse::<SensitivePattern>())
            .collect::<MemoryResult<Vec<_>>>()?;
        for custom in &self.custom_patterns {
            patterns.push(SensitivePattern::custom(&custom.name, &custom.regex)?);
        }
        Ok(patterns)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sensitive_patterns: vec![
                "private_keys".to_string(),
                "security_credentials".to_string(),
                "sensitive_addresses".to_string(),
            ],
            custom_patterns: Vec::new(),
            placeholder: crate::guard::REDACTION_PLACEHOLDER.to_string(),
            proof_statement: crate::guard::MEMORY_INTEGRITY_STATEMENT.to_string(),
        }
    }
}
