//! Dedup Ledger: keeps one session's background findings from repeating.
//!
//! A candidate is novel only if the similarity judgment says "not similar"
//! against every issue resident in the session's lanes and every live
//! [`DedupRecord`]. The check and the record (and, for [`DedupLedger::submit`],
//! the lane append) happen under one per-session lock, so two concurrent
//! findings with equivalent descriptions can never both be admitted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::bridge::DecisionBridge;
use crate::config::DedupConfig;
use crate::error::{ConsilienceError, Result};
use crate::fanout::{CallOutcome, Fanout};
use crate::queue::PriorityQueueStore;
use crate::types::{Priority, QueuedResponse, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A background finding this ledger let through.
    Admitted,
    /// A response the delivery side reported as spoken.
    Delivered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupRecord {
    pub kind: RecordKind,
    pub issue_description: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    recorded_at: Instant,
}

pub struct DedupLedger {
    session: SessionId,
    bridge: DecisionBridge,
    queue: Arc<PriorityQueueStore>,
    window: Duration,
    max_records: usize,
    max_parallel: usize,
    records: Mutex<VecDeque<DedupRecord>>,
    admission: tokio::sync::Mutex<()>,
}

impl DedupLedger {
    pub fn new(
        session: SessionId,
        bridge: DecisionBridge,
        queue: Arc<PriorityQueueStore>,
        config: &DedupConfig,
    ) -> Self {
        Self {
            session,
            bridge,
            queue,
            window: config.window(),
            max_records: config.max_records,
            max_parallel: config.max_parallel,
            records: Mutex::new(VecDeque::new()),
            admission: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether `issue_description` is novel. A novel description is recorded
    /// before this returns.
    pub async fn admit(&self, issue_description: &str, priority: Priority) -> Result<bool> {
        let _guard = self.admission.lock().await;
        if !self.is_novel(issue_description).await? {
            return Ok(false);
        }
        self.record(RecordKind::Admitted, issue_description, priority)?;
        Ok(true)
    }

    /// Admission check plus lane append. Returns `Ok(false)` for a duplicate.
    /// The record is only written once the response is in its lane.
    pub async fn submit(&self, response: &QueuedResponse) -> Result<bool> {
        let _guard = self.admission.lock().await;
        if !self.is_novel(&response.issue_description).await? {
            tracing::debug!(
                session = %self.session,
                issue = %response.issue_description,
                "finding suppressed as duplicate"
            );
            return Ok(false);
        }
        self.queue.enqueue(&self.session, response).await?;
        self.record(RecordKind::Admitted, &response.issue_description, response.priority)?;
        Ok(true)
    }

    /// Record a delivered response without a similarity check.
    pub fn remember(&self, issue_description: &str, priority: Priority) -> Result<()> {
        self.record(RecordKind::Delivered, issue_description, priority)
    }

    fn record(&self, kind: RecordKind, issue_description: &str, priority: Priority) -> Result<()> {
        let mut records = self.lock_records()?;
        records.push_back(DedupRecord {
            kind,
            issue_description: issue_description.to_string(),
            priority,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });
        self.prune(&mut records);
        Ok(())
    }

    /// Live records, oldest first.
    pub fn records(&self) -> Result<Vec<DedupRecord>> {
        let mut records = self.lock_records()?;
        self.prune(&mut records);
        Ok(records.iter().cloned().collect())
    }

    async fn is_novel(&self, candidate: &str) -> Result<bool> {
        let mut existing = self.queue.peek_all(&self.session)?.issue_descriptions();
        existing.extend(self.records()?.into_iter().map(|r| r.issue_description));
        if existing.is_empty() {
            return Ok(true);
        }

        let fanout = Fanout::new(self.max_parallel, self.bridge.call_timeout());
        let hit = fanout
            .first_match(
                existing,
                |known| {
                    let bridge = self.bridge.clone();
                    let candidate = candidate.to_string();
                    async move { bridge.compare_issues(&candidate, &known).await }
                },
                // a comparison that cannot be judged counts as similar
                |outcome| !matches!(outcome, CallOutcome::Done(false)),
            )
            .await;
        Ok(hit.is_none())
    }

    fn prune(&self, records: &mut VecDeque<DedupRecord>) {
        let now = Instant::now();
        records.retain(|r| now.duration_since(r.recorded_at) < self.window);
        let delivered = records
            .iter()
            .filter(|r| r.kind == RecordKind::Delivered)
            .count();
        let mut excess = delivered.saturating_sub(self.max_records);
        records.retain(|r| {
            if excess > 0 && r.kind == RecordKind::Delivered {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<DedupRecord>>> {
        self.records
            .lock()
            .map_err(|_| ConsilienceError::Storage("dedup ledger lock poisoned".into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, QueueConfig};
    use crate::storage::MemoryStore;
    use crate::testkit::{Script, ScriptedService};
    use crate::types::ResponseOrigin;
    use std::sync::atomic::Ordering;

    fn ledger(service: Arc<ScriptedService>) -> (Arc<PriorityQueueStore>, DedupLedger) {
        let queue = Arc::new(PriorityQueueStore::new(
            Arc::new(MemoryStore::new()),
            &QueueConfig::default(),
        ));
        let bridge = DecisionBridge::new(service, &BridgeConfig::default());
        let ledger = DedupLedger::new(
            SessionId::parse("s1").unwrap(),
            bridge,
            queue.clone(),
            &DedupConfig::default(),
        );
        (queue, ledger)
    }

    fn candidate(issue: &str) -> QueuedResponse {
        QueuedResponse::new(Priority::P1, ResponseOrigin::FactualError, "text", vec![], issue)
    }

    #[tokio::test]
    async fn same_issue_twice_admits_once() {
        let (queue, ledger) = ledger(Arc::new(ScriptedService::default()));
        assert!(ledger.submit(&candidate("DNA has 3 bases")).await.unwrap());
        assert!(!ledger.submit(&candidate("DNA has 3 bases")).await.unwrap());
        assert_eq!(queue.read_lane(&ledger.session, Priority::P1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_equivalent_findings_admit_exactly_one() {
        let service = Arc::new(ScriptedService::default());
        service.similar_when("dna");
        service.set_compare_delay(Duration::from_millis(20));
        let (queue, ledger) = ledger(service);

        let a = candidate("DNA has 3 bases");
        let b = candidate("DNA missing a base");
        let (first, second) = tokio::join!(ledger.submit(&a), ledger.submit(&b));
        let admitted = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|x| **x)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(queue.peek_all(&ledger.session).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn distinct_issues_are_both_admitted() {
        let service = Arc::new(ScriptedService::default());
        let (_queue, ledger) = ledger(service.clone());
        assert!(ledger.admit("entropy sign flipped", Priority::P1).await.unwrap());
        assert!(ledger.admit("group seems lost on eigenvalues", Priority::P2).await.unwrap());
        assert_eq!(service.compare_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire_after_window() {
        let (_queue, ledger) = ledger(Arc::new(ScriptedService::default()));
        assert!(ledger.admit("photosynthesis backwards", Priority::P1).await.unwrap());
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(ledger.records().unwrap().is_empty());
        assert!(ledger.admit("photosynthesis backwards", Priority::P1).await.unwrap());
    }

    #[tokio::test]
    async fn records_keep_only_most_recent() {
        let (_queue, ledger) = ledger(Arc::new(ScriptedService::default()));
        for n in 0..7 {
            ledger.remember(&format!("issue {n}"), Priority::P2).unwrap();
        }
        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].issue_description, "issue 2");
    }

    #[tokio::test]
    async fn admitted_findings_do_not_evict_delivered_records() {
        let (_queue, ledger) = ledger(Arc::new(ScriptedService::default()));
        ledger.remember("DNA has four bases", Priority::P0).unwrap();
        for n in 0..6 {
            assert!(ledger.admit(&format!("finding {n}"), Priority::P2).await.unwrap());
        }
        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].kind, RecordKind::Delivered);
        assert_eq!(records[0].issue_description, "DNA has four bases");
    }

    #[tokio::test]
    async fn resident_lane_items_block_admission() {
        let (queue, ledger) = ledger(Arc::new(ScriptedService::default()));
        queue
            .enqueue(&ledger.session, &candidate("mitochondria claim"))
            .await
            .unwrap();
        assert!(!ledger.admit("mitochondria claim", Priority::P1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unjudgeable_comparison_suppresses() {
        let service = Arc::new(ScriptedService::default());
        service.set_compare(Script::Hang);
        let (_queue, ledger) = ledger(service);
        ledger.remember("earlier issue", Priority::P2).unwrap();
        assert!(!ledger.admit("unrelated issue", Priority::P2).await.unwrap());
    }
}
