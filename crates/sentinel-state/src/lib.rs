//! Sentinel-State: storage layer for Sentinel tiered agent memory
//!
//! This crate defines the three backing stores the memory policy layer is
//! built on, plus in-memory implementations of each and a SQLite-backed
//! procedural store.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: uniform contracts, per-key versions for optimistic concurrency,
//! append-only episodic records and unique procedural ids.
//!
//! ## Key Components
//!
//! - `KeyValueStore`: working memory with versioned compare-and-swap
//! - `VectorStore`: episodic memory with nearest-neighbour queries
//! - `RelationalStore`: procedural memory with unique primary keys
//! - `SqliteRelationalStore`: durable `RelationalStore` on SQLite

mod error;
pub mod fakes;
mod schema;
pub mod sqlite;
pub mod storage_traits;

pub use error::StorageError;
pub use schema::{
    EpisodicRecord, EventRecord, ProceduralRecord, Row, CREATE_KNOWN_EXPLOITS,
    INSERT_KNOWN_EXPLOIT, KNOWN_EXPLOITS_TABLE, SELECT_KNOWN_EXPLOIT, SELECT_KNOWN_EXPLOITS,
};
pub use sqlite::SqliteRelationalStore;
pub use storage_traits::{
    CasBatch, EpisodeFilter, KeyValueStore, RelationalStore, ScoredEpisode, StorageResult,
    VectorStore, Version, Versioned,
};
