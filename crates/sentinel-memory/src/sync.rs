//! Memory synchronization coordinator.
//!
//! Runs an explicit, ordered set of named [`SyncTask`]s under optimistic
//! concurrency:
//!
//! 1. each attempt gets a fresh [`SyncTransaction`]; reads record the
//!    version they observed and writes are buffered,
//! 2. commit is a single multi-key compare-and-swap over those versions,
//! 3. a version conflict re-runs the task after exponential backoff, up to
//!    `max_retries`, then the task fails with `ConflictRetryExhausted`,
//! 4. the whole task (retries included) is bounded by the latency budget;
//!    exceeding it cancels the in-flight attempt with `TimeoutExceeded`,
//! 5. each commit publishes `{task, summary, attempts}` on the sync topic.
//!
//! A failing task never affects its siblings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sentinel_state::{CasBatch, StorageError, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::capabilities::PubSub;
use crate::config::{SyncPolicy, SyncStrategy};
use crate::error::{MemoryError, MemoryResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::tiered::{TieredStore, SYNC_NAMESPACE};

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Read/write set of one task attempt.
pub struct SyncTransaction {
    store: TieredStore,
    reads: BTreeMap<String, Version>,
    writes: BTreeMap<String, serde_json::Value>,
}

impl SyncTransaction {
    pub fn new(store: TieredStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read `key`, recording the version seen on first read.
    ///
    /// Buffered writes are visible to later reads in the same transaction.
    pub async fn read(&mut self, key: &str) -> MemoryResult<Option<serde_json::Value>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        let current = self.store.get_versioned(key).await?;
        let version = current.as_ref().map(|v| v.version).unwrap_or(Version::ABSENT);
        self.reads.entry(key.to_string()).or_insert(version);
        Ok(current.map(|v| v.value))
    }

    /// Buffer a write; nothing reaches the store until commit.
    ///
    /// A key written without a prior read still has its current version
    /// recorded, so a concurrent writer to it fails the commit.
    pub async fn write(&mut self, key: &str, value: serde_json::Value) -> MemoryResult<()> {
        if !self.reads.contains_key(key) {
            let version = self
                .store
                .get_versioned(key)
                .await?
                .map(|v| v.version)
                .unwrap_or(Version::ABSENT);
            self.reads.insert(key.to_string(), version);
        }
        self.writes.insert(key.to_string(), value);
        Ok(())
    }

    /// Keys whose versions the commit will check.
    pub fn touched_keys(&self) -> impl Iterator<Item = &str> {
        self.reads.keys().map(String::as_str)
    }

    fn into_batch(self) -> CasBatch {
        CasBatch {
            expect: self.reads.into_iter().collect(),
            writes: self.writes.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A named, idempotent unit of synchronization work.
///
/// `run` may be invoked several times per cycle (once per attempt) and must
/// only touch the store through the transaction.
#[async_trait]
pub trait SyncTask: Send + Sync {
    fn name(&self) -> &str;

    /// Compute the update; the returned summary is published on commit.
    async fn run(&self, txn: &mut SyncTransaction) -> MemoryResult<serde_json::Value>;
}

pub const UPDATE_KNOWN_VULNS: &str = "update_known_vulns";
pub const REFRESH_THREAT_FEEDS: &str = "refresh_threat_feeds";
pub const COMMIT_HUMAN_DECISIONS: &str = "commit_human_decisions";

/// Drains `sync:pending:<feed>` into `sync:<feed>` as a set union.
///
/// The `sync` prefix is reserved, so no agent namespace can reach these keys.
///
/// Re-running after a commit is a no-op, so the task is idempotent.
#[derive(Debug, Clone)]
pub struct MergeQueueTask {
    name: String,
    feed: String,
}

impl MergeQueueTask {
    pub fn new(name: &str, feed: &str) -> Self {
        Self {
            name: name.to_string(),
            feed: feed.to_string(),
        }
    }

    pub fn pending_key(&self) -> String {
        format!("{SYNC_NAMESPACE}:pending:{}", self.feed)
    }

    pub fn merged_key(&self) -> String {
        format!("{SYNC_NAMESPACE}:{}", self.feed)
    }
}

fn as_items(value: Option<serde_json::Value>) -> Vec<serde_json::Value> {
    match value {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

#[async_trait]
impl SyncTask for MergeQueueTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, txn: &mut SyncTransaction) -> MemoryResult<serde_json::Value> {
        let pending_key = self.pending_key();
        let merged_key = self.merged_key();
        let pending = as_items(txn.read(&pending_key).await?);
        let mut merged = as_items(txn.read(&merged_key).await?);

        let mut added = 0usize;
        for item in pending.iter() {
            if !merged.contains(item) {
                merged.push(item.clone());
                added += 1;
            }
        }
        if !pending.is_empty() {
            txn.write(&merged_key, serde_json::Value::Array(merged.clone()))
                .await?;
            txn.write(&pending_key, serde_json::Value::Array(Vec::new()))
                .await?;
        }

        Ok(serde_json::json!({
            "feed": self.feed,
            "drained": pending.len(),
            "added": added,
            "total": merged.len(),
        }))
    }
}

/// Ordered set of uniquely named tasks.
#[derive(Clone, Default)]
pub struct SyncTaskSet {
    tasks: Vec<Arc<dyn SyncTask>>,
}

impl SyncTaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three standard agent-memory tasks.
    pub fn standard() -> Self {
        Self {
            tasks: vec![
                Arc::new(MergeQueueTask::new(UPDATE_KNOWN_VULNS, "known_vulns")),
                Arc::new(MergeQueueTask::new(REFRESH_THREAT_FEEDS, "threat_feeds")),
                Arc::new(MergeQueueTask::new(COMMIT_HUMAN_DECISIONS, "human_decisions")),
            ],
        }
    }

    /// Add a task. Duplicate names are rejected with `InvalidConfig`.
    pub fn push(&mut self, task: Arc<dyn SyncTask>) -> MemoryResult<()> {
        if self.tasks.iter().any(|t| t.name() == task.name()) {
            return Err(MemoryError::InvalidConfig(format!(
                "duplicate sync task name: {}",
                task.name()
            )));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn with_task(mut self, task: Arc<dyn SyncTask>) -> MemoryResult<Self> {
        self.push(task)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SyncTask>> {
        self.tasks.iter()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Committed {
        summary: serde_json::Value,
        /// `false` if the delta could not be published after the commit.
        published: bool,
    },
    Failed {
        kind: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl TaskOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TaskStatus::Committed { .. })
    }

    /// Error kind (see [`MemoryError::kind`]) for failed tasks.
    pub fn error_kind(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { kind, .. } => Some(kind),
            TaskStatus::Committed { .. } => None,
        }
    }

    fn failed(task: &str, attempts: u32, err: &MemoryError) -> Self {
        Self {
            task: task.to_string(),
            attempts,
            status: TaskStatus::Failed {
                kind: err.kind().to_string(),
                error: err.to_string(),
            },
        }
    }
}

/// Per-task outcomes of one cycle, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcomes: Vec<TaskOutcome>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.committed()
    }

    pub fn all_committed(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::is_committed)
    }

    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task == task)
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SyncCoordinator {
    store: TieredStore,
    pubsub: Arc<dyn PubSub>,
    policy: SyncPolicy,
}

impl SyncCoordinator {
    pub fn new(store: TieredStore, pubsub: Arc<dyn PubSub>, policy: SyncPolicy) -> MemoryResult<Self> {
        policy.validate()?;
        Ok(Self {
            store,
            pubsub,
            policy,
        })
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Run every task once. Never fails as a whole; see the per-task outcomes.
    pub async fn run_sync_cycle(&self, tasks: &SyncTaskSet) -> SyncReport {
        let started = Instant::now();
        let outcomes = match self.policy.strategy {
            SyncStrategy::OptimisticConcurrency => self.run_concurrent(tasks).await,
            SyncStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(tasks.len());
                for task in tasks.iter() {
                    outcomes.push(self.run_task(Arc::clone(task)).await);
                }
                outcomes
            }
        };

        let report = SyncReport {
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        obs::emit_sync_cycle_finished(report.committed(), report.failed(), report.duration_ms);
        report
    }

    async fn run_concurrent(&self, tasks: &SyncTaskSet) -> Vec<TaskOutcome> {
        let mut set = JoinSet::new();
        for (idx, task) in tasks.iter().enumerate() {
            let this = self.clone();
            let task = Arc::clone(task);
            set.spawn(async move { (idx, this.run_task(task).await) });
        }

        let mut slots: Vec<Option<TaskOutcome>> = vec![None; tasks.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(err) => warn!(error = %err, "sync task aborted"),
            }
        }

        tasks
            .iter()
            .zip(slots)
            .map(|(task, slot)| {
                slot.unwrap_or_else(|| {
                    METRICS.inc_sync_failures();
                    TaskOutcome {
                        task: task.name().to_string(),
                        attempts: 0,
                        status: TaskStatus::Failed {
                            kind: "aborted".to_string(),
                            error: "task panicked or was cancelled".to_string(),
                        },
                    }
                })
            })
            .collect()
    }

    async fn run_task(&self, task: Arc<dyn SyncTask>) -> TaskOutcome {
        let name = task.name().to_string();
        let attempts = AtomicU32::new(0);
        let budget = self.policy.latency_budget();

        let result = match tokio::time::timeout(budget, self.attempt(&*task, &attempts)).await {
            Ok(result) => result,
            Err(_) => Err(MemoryError::TimeoutExceeded {
                operation: format!("sync task {name}"),
                budget_ms: self.policy.latency_budget_ms,
            }),
        };
        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(summary) => {
                METRICS.inc_sync_commits();
                obs::emit_sync_task_committed(&name, attempts);
                let published = self.publish(&name, &summary, attempts).await;
                TaskOutcome {
                    task: name,
                    attempts,
                    status: TaskStatus::Committed { summary, published },
                }
            }
            Err(err) => {
                METRICS.inc_sync_failures();
                obs::emit_sync_task_failed(&name, err.kind(), &err);
                TaskOutcome::failed(&name, attempts, &err)
            }
        }
    }

    async fn attempt(
        &self,
        task: &dyn SyncTask,
        attempts: &AtomicU32,
    ) -> MemoryResult<serde_json::Value> {
        let max_attempts = self.policy.max_retries + 1;
        for attempt in 1..=max_attempts {
            attempts.store(attempt, Ordering::SeqCst);
            let mut txn = SyncTransaction::new(self.store.clone());
            let summary = task.run(&mut txn).await?;

            let batch = txn.into_batch();
            if batch.is_empty() {
                return Ok(summary);
            }
            match self.store.compare_and_swap(batch).await {
                Ok(()) => return Ok(summary),
                Err(MemoryError::Storage(StorageError::VersionConflict { key, .. })) => {
                    METRICS.inc_sync_conflicts();
                    obs::emit_sync_task_retry(task.name(), attempt, &key);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(MemoryError::ConflictRetryExhausted {
            task: task.name().to_string(),
            attempts: max_attempts,
        })
    }

    async fn publish(&self, task: &str, summary: &serde_json::Value, attempts: u32) -> bool {
        let message = serde_json::json!({
            "task": task,
            "summary": summary,
            "attempts": attempts,
        });
        match self.pubsub.publish(&self.policy.topic, message).await {
            Ok(()) => true,
            Err(err) => {
                obs::emit_publish_failed(&self.policy.topic, &err);
                false
            }
        }
    }

    /// Run cycles every `interval` until `shutdown` becomes `true` or its
    /// sender is dropped. Resolves to the number of cycles run.
    pub fn spawn_periodic(
        &self,
        tasks: SyncTaskSet,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<u64> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut cycles = 0u64;
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = this.run_sync_cycle(&tasks).await;
                        cycles += 1;
                        info!(
                            cycle = cycles,
                            committed = report.committed(),
                            failed = report.failed(),
                            "sync cycle complete"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            cycles
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_transaction_reads_own_writes() {
        let store = TieredStore::in_memory();
        store.set("k", json!(1)).await.unwrap();

        let mut txn = SyncTransaction::new(store.clone());
        assert_eq!(txn.read("k").await.unwrap(), Some(json!(1)));
        txn.write("k", json!(2)).await.unwrap();
        assert_eq!(txn.read("k").await.unwrap(), Some(json!(2)));
        assert_eq!(txn.touched_keys().collect::<Vec<_>>(), vec!["k"]);

        // Nothing is visible before commit.
        assert_eq!(store.get("k").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_transaction_batch_expects_absent_for_missing_keys() {
        let mut txn = SyncTransaction::new(TieredStore::in_memory());
        assert_eq!(txn.read("missing").await.unwrap(), None);
        txn.write("missing", json!(true)).await.unwrap();

        let batch = txn.into_batch();
        assert_eq!(batch.expect, vec![("missing".to_string(), Version::ABSENT)]);
        assert_eq!(batch.writes.len(), 1);
    }

    #[tokio::test]
    async fn test_blind_write_records_current_version() {
        let store = TieredStore::in_memory();
        store.set("k", json!("old")).await.unwrap();
        store.set("k", json!("older")).await.unwrap();

        let mut txn = SyncTransaction::new(store.clone());
        txn.write("k", json!("new")).await.unwrap();
        txn.write("fresh", json!(1)).await.unwrap();

        let batch = txn.into_batch();
        assert_eq!(
            batch.expect,
            vec![
                ("fresh".to_string(), Version::ABSENT),
                ("k".to_string(), Version::new(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_queue_is_idempotent() {
        let store = TieredStore::in_memory();
        let task = MergeQueueTask::new("merge", "feed");
        store
            .set(&task.pending_key(), json!(["a", "b", "a"]))
            .await
            .unwrap();

        for _ in 0..2 {
            let mut txn = SyncTransaction::new(store.clone());
            task.run(&mut txn).await.unwrap();
            store.compare_and_swap(txn.into_batch()).await.unwrap();
        }

        assert_eq!(store.get("sync:feed").await.unwrap(), json!(["a", "b"]));
        assert_eq!(store.get("sync:pending:feed").await.unwrap(), json!([]));
    }

    #[test]
    fn test_task_set_rejects_duplicate_names() {
        let mut set = SyncTaskSet::standard();
        assert_eq!(
            set.names(),
            vec![UPDATE_KNOWN_VULNS, REFRESH_THREAT_FEEDS, COMMIT_HUMAN_DECISIONS]
        );
        let err = set
            .push(Arc::new(MergeQueueTask::new(UPDATE_KNOWN_VULNS, "x")))
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfig(_)));
        assert_eq!(set.len(), 3);
    }
}
