//! Storage trait definitions for Sentinel memory tiers
//!
//! These traits define the three backing stores the policy layer sits on:
//! - `KeyValueStore`: working memory (ephemeral, versioned per key)
//! - `VectorStore`: episodic memory (append-only, nearest-neighbour search)
//! - `RelationalStore`: procedural memory (durable rows, unique ids)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::{EpisodicRecord, Row};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// KeyValueStore — Working Memory
// ---------------------------------------------------------------------------

/// Per-key version used for optimistic concurrency.
///
/// `Version::ABSENT` is reported for keys that have never been written, so a
/// compare-and-swap against `ABSENT` means "create only if missing".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// Version reported for a key that does not exist.
    pub const ABSENT: Self = Version(0);

    pub const fn new(v: u64) -> Self {
        Version(v)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Next version after a write.
    pub fn next(&self) -> Self {
        Version(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value paired with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// An atomic multi-key compare-and-swap.
///
/// Every `expect` entry must still be at its recorded version for the batch
/// to apply; either all `writes` land or none do.
#[derive(Debug, Clone, Default)]
pub struct CasBatch {
    pub expect: Vec<(String, Version)>,
    pub writes: Vec<(String, serde_json::Value)>,
}

impl CasBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, key: impl Into<String>, version: Version) -> Self {
        self.expect.push((key.into(), version));
        self
    }

    pub fn write(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.writes.push((key.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Ephemeral key-value store backing working memory.
///
/// Guarantees:
/// - `get` returns `StorageError::NotFound` for absent keys.
/// - Every successful write bumps the key's version by one.
/// - `compare_and_swap` is all-or-nothing across the batch.
/// - No durability contract; persistence across restarts is backend-defined.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<serde_json::Value>;

    /// Unconditionally overwrite a value.
    async fn set(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Read a value together with its version. `None` if absent.
    async fn get_versioned(&self, key: &str)
        -> StorageResult<Option<Versioned<serde_json::Value>>>;

    /// Apply `batch` iff every expected version still matches.
    ///
    /// Returns `StorageError::VersionConflict` for the first mismatching key
    /// and leaves the store untouched.
    async fn compare_and_swap(&self, batch: CasBatch) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// VectorStore — Episodic Memory
// ---------------------------------------------------------------------------

/// Filters applied to a nearest-neighbour query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFilter {
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl EpisodeFilter {
    /// Filter that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes the categorical filter.
    pub fn matches(&self, record: &EpisodicRecord) -> bool {
        self.category
            .as_deref()
            .map_or(true, |c| c == record.category)
    }
}

/// A query hit with its similarity score (higher is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEpisode {
    pub record: EpisodicRecord,
    pub score: f32,
}

/// Vector-searchable, append-only document store.
///
/// Guarantees:
/// - Records are immutable once stored; there is no update or delete.
/// - Storing a record whose id is already present is a no-op, so a retried
///   write never duplicates an episode.
/// - `query` returns hits ranked by descending similarity, honoring the
///   category filter and limit.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append a record, or do nothing if its id is already stored.
    async fn store(&self, record: EpisodicRecord) -> StorageResult<()>;

    /// Rank stored records by similarity to `vector`.
    async fn query(&self, vector: &[f32], filter: &EpisodeFilter)
        -> StorageResult<Vec<ScoredEpisode>>;
}

// ---------------------------------------------------------------------------
// RelationalStore — Procedural Memory
// ---------------------------------------------------------------------------

/// Durable relational store backing procedural memory.
///
/// Statements use positional `?` placeholders bound from `params`.
///
/// Guarantees:
/// - Inserting a row whose primary key already exists fails with
///   `StorageError::ConstraintViolation` and leaves the table unchanged.
/// - Rows are never deleted implicitly.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<u64>;

    /// Run a read-only statement and return the matching rows.
    async fn query(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<Vec<Row>>;
}
