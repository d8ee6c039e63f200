//! Memory roots and integrity proofs.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sentinel_state::EventRecord;

use crate::capabilities::Prover;
use crate::error::{MemoryError, MemoryResult};
use crate::obs;

/// Statement proven for every memory root.
pub const MEMORY_INTEGRITY_STATEMENT: &str = "Memory hash matches state";

/// SHA-256 digest identifying one memory state.
///
/// The inner string is always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRoot(String);

impl MemoryRoot {
    /// Digest of a JSON snapshot with object keys in canonical order.
    pub fn from_snapshot(snapshot: &serde_json::Value) -> Self {
        let canonical = canonicalize(snapshot);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        MemoryRoot(hex::encode(hasher.finalize()))
    }

    /// Digest of a context window.
    pub fn from_window(window: &[EventRecord]) -> MemoryResult<Self> {
        Ok(Self::from_snapshot(&serde_json::to_value(window)?))
    }

    /// Wrap a claimed root supplied by a caller.
    pub fn from_hex(root: &str) -> MemoryResult<Self> {
        if root.len() != 64 || !root.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MemoryError::InvalidConfig(format!(
                "memory root must be 64 hex chars, got {root:?}"
            )));
        }
        Ok(MemoryRoot(root.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for MemoryRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recursively rebuild objects so keys serialize in sorted order regardless
/// of serde_json's map implementation.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// A proof that a memory root corresponds to a valid prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub statement: String,
    pub root: MemoryRoot,
    /// Hex-encoded proof bytes from the proving backend.
    pub proof: String,
}

/// Produces and checks integrity proofs. Holds no mutable state and never
/// writes to memory.
#[derive(Clone)]
pub struct IntegrityGuard {
    prover: Arc<dyn Prover>,
    statement: String,
}

impl IntegrityGuard {
    pub fn new(prover: Arc<dyn Prover>) -> Self {
        Self::with_statement(prover, MEMORY_INTEGRITY_STATEMENT)
    }

    pub fn with_statement(prover: Arc<dyn Prover>, statement: &str) -> Self {
        Self {
            prover,
            statement: statement.to_string(),
        }
    }

    /// Prove that `root` matches a valid memory state. The root is the witness.
    pub async fn prove_integrity(&self, root: &MemoryRoot) -> MemoryResult<Proof> {
        let bytes = self
            .prover
            .prove(&self.statement, root.as_str().as_bytes())
            .await
            .map_err(|e| MemoryError::ProvingFailed(e.to_string()))?;

        obs::emit_proof_produced(root.short(), bytes.len());
        Ok(Proof {
            statement: self.statement.clone(),
            root: root.clone(),
            proof: hex::encode(bytes),
        })
    }

    /// As [`prove_integrity`](Self::prove_integrity), bounded by a caller deadline.
    pub async fn prove_integrity_within(
        &self,
        root: &MemoryRoot,
        deadline: Duration,
    ) -> MemoryResult<Proof> {
        tokio::time::timeout(deadline, self.prove_integrity(root))
            .await
            .map_err(|_| MemoryError::TimeoutExceeded {
                operation: "prove_integrity".to_string(),
                budget_ms: deadline.as_millis() as u64,
            })?
    }

    /// Re-verify a proof against its own root through the prover.
    pub async fn verify(&self, proof: &Proof) -> MemoryResult<bool> {
        let bytes = hex::decode(&proof.proof)
            .map_err(|e| MemoryError::ProvingFailed(format!("malformed proof: {e}")))?;
        self.prover
            .verify(&proof.statement, proof.root.as_str().as_bytes(), &bytes)
            .await
            .map_err(|e| MemoryError::ProvingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(MemoryRoot::from_snapshot(&a), MemoryRoot::from_snapshot(&b));
    }

    #[test]
    fn test_root_differs_on_content() {
        let a = MemoryRoot::from_snapshot(&json!([1, 2]));
        let b = MemoryRoot::from_snapshot(&json!([2, 1]));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_from_hex_validates() {
        assert!(MemoryRoot::from_hex("abc").is_err());
        assert!(MemoryRoot::from_hex(&"g".repeat(64)).is_err());
        let root = MemoryRoot::from_hex(&"AB".repeat(32)).unwrap();
        assert_eq!(root.as_str(), "ab".repeat(32));
        assert_eq!(root.short().len(), 12);
    }
}
