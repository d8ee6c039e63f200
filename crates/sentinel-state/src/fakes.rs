//! In-memory backends for the storage traits
//!
//! Provides `MemoryKeyValueStore`, `MemoryVectorStore`, and
//! `MemoryRelationalStore` that satisfy the trait contracts without any
//! external dependencies. Used by tests and by the daemon's default wiring.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::{EpisodicRecord, Row};
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryKeyValueStore
// ---------------------------------------------------------------------------

/// In-memory key-value store backed by a `HashMap<key, (version, value)>`.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Versioned<serde_json::Value>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn version_of(
        entries: &HashMap<String, Versioned<serde_json::Value>>,
        key: &str,
    ) -> Version {
        entries.get(key).map_or(Version::ABSENT, |e| e.version)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StorageResult<serde_json::Value> {
        lock(&self.entries)
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let mut entries = lock(&self.entries);
        let version = Self::version_of(&entries, key).next();
        entries.insert(key.to_string(), Versioned { value, version });
        Ok(())
    }

    async fn get_versioned(
        &self,
        key: &str,
    ) -> StorageResult<Option<Versioned<serde_json::Value>>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn compare_and_swap(&self, batch: CasBatch) -> StorageResult<()> {
        let mut entries = lock(&self.entries);

        for (key, expected) in &batch.expect {
            let actual = Self::version_of(&entries, key);
            if actual != *expected {
                debug!(key = %key, ?expected, ?actual, "compare_and_swap rejected");
                return Err(StorageError::VersionConflict {
                    key: key.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        for (key, value) in batch.writes {
            let version = Self::version_of(&entries, &key).next();
            entries.insert(key, Versioned { value, version });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryVectorStore
// ---------------------------------------------------------------------------

/// In-memory, append-only vector store ranking by cosine similarity.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    records: Mutex<Vec<EpisodicRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored record in insertion order.
    pub fn records(&self) -> Vec<EpisodicRecord> {
        lock(&self.records).clone()
    }
}

/// Cosine similarity; zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn store(&self, record: EpisodicRecord) -> StorageResult<()> {
        let mut records = lock(&self.records);
        if records.iter().any(|r| r.id == record.id) {
            debug!(id = %record.id, "episode already stored");
            return Ok(());
        }
        if let Some(first) = records.first() {
            if first.embedding.len() != record.embedding.len() {
                return Err(StorageError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: record.embedding.len(),
                });
            }
        }
        records.push(record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &EpisodeFilter,
    ) -> StorageResult<Vec<ScoredEpisode>> {
        let records = lock(&self.records);
        if let Some(first) = records.first() {
            if first.embedding.len() != vector.len() {
                return Err(StorageError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: vector.len(),
                });
            }
        }

        let mut hits: Vec<ScoredEpisode> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| ScoredEpisode {
                score: cosine_similarity(vector, &r.embedding),
                record: r.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(limit) = filter.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// MemoryRelationalStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Parsed form of the minimal dialect the in-memory store understands.
#[derive(Debug, PartialEq)]
enum Statement {
    CreateTable {
        table: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    Insert {
        table: String,
        placeholders: usize,
    },
    Select {
        table: String,
        where_column: Option<String>,
    },
}

fn invalid(statement: &str) -> StorageError {
    StorageError::InvalidStatement(statement.to_string())
}

/// Split `head (a, b, c)` into `head` and the comma-separated items.
fn split_parenthesized(statement: &str) -> Option<(&str, Vec<String>)> {
    let open = statement.find('(')?;
    let close = statement.rfind(')')?;
    if close < open || !statement[close + 1..].trim().is_empty() {
        return None;
    }
    let items = statement[open + 1..close]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Some((statement[..open].trim(), items))
}

fn parse(statement: &str) -> StorageResult<Statement> {
    let trimmed = statement.trim().trim_end_matches(';').trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("CREATE TABLE") {
        let (head, columns) = split_parenthesized(trimmed).ok_or_else(|| invalid(statement))?;
        let words: Vec<&str> = head.split_whitespace().collect();
        let (if_not_exists, name) = match words.as_slice() {
            [_, _, name] => (false, *name),
            [_, _, if_, not, exists, name]
                if if_.eq_ignore_ascii_case("IF")
                    && not.eq_ignore_ascii_case("NOT")
                    && exists.eq_ignore_ascii_case("EXISTS") =>
            {
                (true, *name)
            }
            _ => return Err(invalid(statement)),
        };
        // Column items may carry type and constraint words; only the name is kept.
        let columns: Vec<String> = columns
            .iter()
            .filter_map(|c| c.split_whitespace().next())
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(invalid(statement));
        }
        return Ok(Statement::CreateTable {
            table: name.to_string(),
            columns,
            if_not_exists,
        });
    }

    if upper.starts_with("INSERT INTO") {
        let (head, values) = split_parenthesized(trimmed).ok_or_else(|| invalid(statement))?;
        let words: Vec<&str> = head.split_whitespace().collect();
        let name = match words.as_slice() {
            [_, _, name, values_kw] if values_kw.eq_ignore_ascii_case("VALUES") => *name,
            _ => return Err(invalid(statement)),
        };
        if values.is_empty() || values.iter().any(|v| v != "?") {
            return Err(invalid(statement));
        }
        return Ok(Statement::Insert {
            table: name.to_string(),
            placeholders: values.len(),
        });
    }

    if upper.starts_with("SELECT") {
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        return match words.as_slice() {
            [_, "*", from, name] if from.eq_ignore_ascii_case("FROM") => Ok(Statement::Select {
                table: name.to_string(),
                where_column: None,
            }),
            [_, "*", from, name, order, by, rowid]
                if from.eq_ignore_ascii_case("FROM")
                    && order.eq_ignore_ascii_case("ORDER")
                    && by.eq_ignore_ascii_case("BY")
                    && rowid.eq_ignore_ascii_case("rowid") =>
            {
                Ok(Statement::Select {
                    table: name.to_string(),
                    where_column: None,
                })
            }
            [_, "*", from, name, where_kw, column, "=", "?"]
                if from.eq_ignore_ascii_case("FROM") && where_kw.eq_ignore_ascii_case("WHERE") =>
            {
                Ok(Statement::Select {
                    table: name.to_string(),
                    where_column: Some(column.to_string()),
                })
            }
            _ => Err(invalid(statement)),
        };
    }

    Err(invalid(statement))
}

/// In-memory relational store with a minimal SQL dialect.
///
/// Supported statements:
/// - `CREATE TABLE [IF NOT EXISTS] t (c0 [type...], c1, ...)`; `c0` is the primary key
/// - `INSERT INTO t VALUES (?, ?, ...)`
/// - `SELECT * FROM t [ORDER BY rowid]` (insertion order)
/// - `SELECT * FROM t WHERE c = ?`
#[derive(Debug, Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`, or `None` if the table does not exist.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        lock(&self.tables).get(table).map(|t| t.rows.len())
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn execute(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<u64> {
        match parse(statement)? {
            Statement::CreateTable {
                table,
                columns,
                if_not_exists,
            } => {
                let mut tables = lock(&self.tables);
                if tables.contains_key(&table) {
                    if if_not_exists {
                        return Ok(0);
                    }
                    return Err(StorageError::InvalidStatement(format!(
                        "table {table} already exists"
                    )));
                }
                debug!(table = %table, columns = columns.len(), "table created");
                tables.insert(
                    table,
                    Table {
                        columns,
                        rows: Vec::new(),
                    },
                );
                Ok(0)
            }
            Statement::Insert {
                table,
                placeholders,
            } => {
                if placeholders != params.len() {
                    return Err(StorageError::InvalidStatement(format!(
                        "expected {placeholders} params, got {}",
                        params.len()
                    )));
                }
                let mut tables = lock(&self.tables);
                let target = tables
                    .get_mut(&table)
                    .ok_or_else(|| StorageError::UnknownTable {
                        table: table.clone(),
                    })?;
                if target.columns.len() != placeholders {
                    return Err(StorageError::InvalidStatement(format!(
                        "table {table} has {} columns, got {placeholders} values",
                        target.columns.len()
                    )));
                }
                let key = &params[0];
                if target.rows.iter().any(|row| row.first() == Some(key)) {
                    let id = key
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| key.to_string());
                    debug!(table = %table, id = %id, "duplicate primary key rejected");
                    return Err(StorageError::ConstraintViolation { table, id });
                }
                target.rows.push(params.to_vec());
                Ok(1)
            }
            Statement::Select { .. } => Err(StorageError::InvalidStatement(
                "use query() for SELECT statements".to_string(),
            )),
        }
    }

    async fn query(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<Vec<Row>> {
        let (table, where_column) = match parse(statement)? {
            Statement::Select {
                table,
                where_column,
            } => (table, where_column),
            _ => {
                return Err(StorageError::InvalidStatement(
                    "query() only accepts SELECT statements".to_string(),
                ))
            }
        };

        let tables = lock(&self.tables);
        let target = tables
            .get(&table)
            .ok_or_else(|| StorageError::UnknownTable {
                table: table.clone(),
            })?;

        let Some(column) = where_column else {
            return Ok(target.rows.clone());
        };

        let idx = target
            .columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| StorageError::InvalidStatement(format!("unknown column {column}")))?;
        let needle = params.first().ok_or_else(|| {
            StorageError::InvalidStatement("missing parameter for WHERE clause".to_string())
        })?;

        Ok(target
            .rows
            .iter()
            .filter(|row| row.get(idx) == Some(needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_if_not_exists() {
        let stmt = parse("CREATE TABLE IF NOT EXISTS known_exploits (id, pattern, observed_at)")
            .unwrap();
        assert_eq!(
            stmt,
            Statement::CreateTable {
                table: "known_exploits".to_string(),
                columns: vec!["id".into(), "pattern".into(), "observed_at".into()],
                if_not_exists: true,
            }
        );
    }

    #[test]
    fn test_parse_create_keeps_column_names_only() {
        let Statement::CreateTable { columns, .. } = parse(crate::CREATE_KNOWN_EXPLOITS).unwrap()
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(columns, vec!["id", "pattern", "observed_at"]);
    }

    #[test]
    fn test_parse_select_ordered_by_rowid() {
        let stmt = parse(crate::SELECT_KNOWN_EXPLOITS).unwrap();
        assert_eq!(
            stmt,
            Statement::Select {
                table: "known_exploits".to_string(),
                where_column: None,
            }
        );
    }

    #[test]
    fn test_parse_insert_counts_placeholders() {
        let stmt = parse("insert into known_exploits values (?, ?, ?);").unwrap();
        assert_eq!(
            stmt,
            Statement::Insert {
                table: "known_exploits".to_string(),
                placeholders: 3,
            }
        );
    }

    #[test]
    fn test_parse_select_with_where() {
        let stmt = parse("SELECT * FROM known_exploits WHERE id = ?").unwrap();
        assert_eq!(
            stmt,
            Statement::Select {
                table: "known_exploits".to_string(),
                where_column: Some("id".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(parse("DELETE FROM known_exploits").is_err());
        assert!(parse("INSERT INTO t VALUES ('x')").is_err());
        assert!(parse("SELECT id FROM t").is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
