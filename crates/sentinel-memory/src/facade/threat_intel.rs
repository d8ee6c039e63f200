//! Threat-intel profile: known exploits in procedural memory, fanned out to
//! other agents over pub/sub.
//!
//! `record_exploit` is insert-then-publish. The two steps are not atomic: a
//! publish failure after a successful insert leaves the row in place and is
//! reported through [`ExploitRecorded::published`].

use std::sync::Arc;

use sentinel_state::{
    ProceduralRecord, CREATE_KNOWN_EXPLOITS, INSERT_KNOWN_EXPLOIT, KNOWN_EXPLOITS_TABLE,
    SELECT_KNOWN_EXPLOIT, SELECT_KNOWN_EXPLOITS,
};
use serde::{Deserialize, Serialize};

use super::AgentMemory;
use crate::capabilities::PubSub;
use crate::error::{MemoryError, MemoryResult};
use crate::obs;

/// Topic exploit updates are published on.
pub const THREAT_INTEL_TOPIC: &str = "threat_intel";

/// Message type of an exploit update.
pub const EXPLOIT_UPDATE: &str = "exploit_update";

/// Result of a successful insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploitRecorded {
    pub record: ProceduralRecord,
    /// `false` when the insert committed but the update was not delivered.
    pub published: bool,
}

pub struct ThreatIntelMemory {
    core: AgentMemory,
    pubsub: Arc<dyn PubSub>,
}

impl ThreatIntelMemory {
    pub fn new(core: AgentMemory, pubsub: Arc<dyn PubSub>) -> Self {
        Self { core, pubsub }
    }

    pub fn core(&self) -> &AgentMemory {
        &self.core
    }

    /// Create the exploits table if missing.
    pub async fn ensure_schema(&self) -> MemoryResult<()> {
        self.core.store().execute(CREATE_KNOWN_EXPLOITS, &[]).await?;
        Ok(())
    }

    /// Insert `exploit`, then publish an `exploit_update`.
    ///
    /// A duplicate id fails with `ConstraintViolation`; nothing is written
    /// or published in that case.
    pub async fn record_exploit(&self, exploit: ProceduralRecord) -> MemoryResult<ExploitRecorded> {
        self.core
            .store()
            .execute(INSERT_KNOWN_EXPLOIT, &exploit.to_params())
            .await?;

        let message = serde_json::json!({
            "type": EXPLOIT_UPDATE,
            "data": exploit,
        });
        let published = match self.pubsub.publish(THREAT_INTEL_TOPIC, message).await {
            Ok(()) => true,
            Err(err) => {
                obs::emit_publish_failed(THREAT_INTEL_TOPIC, &err);
                false
            }
        };

        obs::emit_exploit_recorded(&exploit.id, published);
        Ok(ExploitRecorded {
            record: exploit,
            published,
        })
    }

    /// Look up one exploit by id.
    pub async fn known_exploit(&self, id: &str) -> MemoryResult<ProceduralRecord> {
        let rows = self
            .core
            .store()
            .query_rows(SELECT_KNOWN_EXPLOIT, &[serde_json::Value::String(id.to_string())])
            .await?;
        match rows.first() {
            Some(row) => Ok(ProceduralRecord::from_row(row)?),
            None => Err(MemoryError::NotFound {
                key: format!("{KNOWN_EXPLOITS_TABLE}:{id}"),
            }),
        }
    }

    /// Every known exploit, in insertion order.
    pub async fn known_exploits(&self) -> MemoryResult<Vec<ProceduralRecord>> {
        let rows = self
            .core
            .store()
            .query_rows(SELECT_KNOWN_EXPLOITS, &[])
            .await?;
        rows.iter()
            .map(|row| ProceduralRecord::from_row(row).map_err(MemoryError::from))
            .collect()
    }
}
