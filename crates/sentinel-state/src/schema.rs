//! Record types stored in the three memory tiers
//!
//! - `EventRecord`: one entry of an agent's working-memory sequence
//! - `EpisodicRecord`: vector-indexed, append-only episode
//! - `ProceduralRecord`: durable row in the `known_exploits` table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A relational row: positional column values.
pub type Row = Vec<serde_json::Value>;

/// Table holding procedural knowledge about observed exploits.
pub const KNOWN_EXPLOITS_TABLE: &str = "known_exploits";

/// DDL for the exploits table (id is the unique primary key).
pub const CREATE_KNOWN_EXPLOITS: &str = "CREATE TABLE IF NOT EXISTS known_exploits \
     (id TEXT PRIMARY KEY, pattern TEXT NOT NULL, observed_at TEXT NOT NULL)";

/// Insert statement for one procedural record.
pub const INSERT_KNOWN_EXPLOIT: &str = "INSERT INTO known_exploits VALUES (?, ?, ?)";

/// Lookup of one procedural record by id.
pub const SELECT_KNOWN_EXPLOIT: &str = "SELECT * FROM known_exploits WHERE id = ?";

/// Full scan of the exploits table in insertion order.
pub const SELECT_KNOWN_EXPLOITS: &str = "SELECT * FROM known_exploits ORDER BY rowid";

/// A single event in an agent's working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventRecord {
    /// Create a record stamped with the current time.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A vector-indexed document in episodic memory. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub category: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EpisodicRecord {
    /// Create a record with a fresh id.
    pub fn new(embedding: Vec<f32>, category: &str, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            category: category.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Replace the generated id, e.g. with one derived from content.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A durable structured fact: `(id, pattern, observed_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceduralRecord {
    pub id: String,
    pub pattern: String,
    pub observed_at: DateTime<Utc>,
}

impl ProceduralRecord {
    pub fn new(id: &str, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            observed_at: Utc::now(),
        }
    }

    /// Positional parameters matching `INSERT_KNOWN_EXPLOIT`.
    pub fn to_params(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.id.clone()),
            serde_json::Value::String(self.pattern.clone()),
            serde_json::Value::String(self.observed_at.to_rfc3339()),
        ]
    }

    /// Decode a row produced by `SELECT * FROM known_exploits`.
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        let column = |idx: usize, name: &str| -> Result<&str, StorageError> {
            row.get(idx).and_then(|v| v.as_str()).ok_or_else(|| {
                StorageError::InvalidStatement(format!(
                    "row column {idx} ({name}) missing or not a string"
                ))
            })
        };

        let observed_at = DateTime::parse_from_rfc3339(column(2, "observed_at")?)
            .map_err(|e| StorageError::InvalidStatement(format!("observed_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            id: column(0, "id")?.to_string(),
            pattern: column(1, "pattern")?.to_string(),
            observed_at,
        })
    }
}
