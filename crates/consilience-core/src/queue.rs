//! Priority Queue Store: four independent FIFO lanes per session.
//!
//! No reordering happens here. Cross-lane precedence belongs to whatever
//! drains the lanes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::QueueConfig;
use crate::error::{ConsilienceError, Result};
use crate::storage::LaneStore;
use crate::types::{Priority, QueuedResponse, SessionId};

/// All four lanes of one session at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaneSnapshot {
    #[serde(rename = "P0")]
    pub p0: Vec<QueuedResponse>,
    #[serde(rename = "P1")]
    pub p1: Vec<QueuedResponse>,
    #[serde(rename = "P2")]
    pub p2: Vec<QueuedResponse>,
    #[serde(rename = "P3")]
    pub p3: Vec<QueuedResponse>,
}

impl LaneSnapshot {
    pub fn lane(&self, priority: Priority) -> &[QueuedResponse] {
        match priority {
            Priority::P0 => &self.p0,
            Priority::P1 => &self.p1,
            Priority::P2 => &self.p2,
            Priority::P3 => &self.p3,
        }
    }

    fn lane_mut(&mut self, priority: Priority) -> &mut Vec<QueuedResponse> {
        match priority {
            Priority::P0 => &mut self.p0,
            Priority::P1 => &mut self.p1,
            Priority::P2 => &mut self.p2,
            Priority::P3 => &mut self.p3,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedResponse> {
        Priority::all().iter().flat_map(|p| self.lane(*p).iter())
    }

    pub fn len(&self) -> usize {
        self.p0.len() + self.p1.len() + self.p2.len() + self.p3.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blank issue descriptions resident in any lane.
    pub fn issue_descriptions(&self) -> Vec<String> {
        self.iter()
            .map(|r| r.issue_description.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub struct PriorityQueueStore {
    lanes: Arc<dyn LaneStore>,
    retry_backoff: Duration,
}

impl PriorityQueueStore {
    pub fn new(lanes: Arc<dyn LaneStore>, config: &QueueConfig) -> Self {
        Self {
            lanes,
            retry_backoff: config.write_retry_backoff(),
        }
    }

    /// Append to the tail of the response's lane. A failed write is retried
    /// once after a short backoff; a second failure is surfaced as
    /// `QueueWrite` and the response is dropped.
    pub async fn enqueue(&self, session: &SessionId, response: &QueuedResponse) -> Result<()> {
        let first = match self.lanes.append(session, response) {
            Ok(()) => {
                tracing::debug!(%session, priority = %response.priority, origin = ?response.origin, "enqueued");
                return Ok(());
            }
            Err(e) => e,
        };
        tracing::warn!(%session, priority = %response.priority, error = %first, "lane append failed, retrying");
        tokio::time::sleep(self.retry_backoff).await;

        self.lanes.append(session, response).map_err(|e| {
            tracing::error!(
                %session,
                priority = %response.priority,
                error = %e,
                "lane append failed twice; response dropped"
            );
            ConsilienceError::QueueWrite(e.to_string())
        })
    }

    pub fn read_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        self.lanes.read_lane(session, priority)
    }

    pub fn peek_all(&self, session: &SessionId) -> Result<LaneSnapshot> {
        let mut snapshot = LaneSnapshot::default();
        for priority in Priority::all() {
            *snapshot.lane_mut(*priority) = self.lanes.read_lane(session, *priority)?;
        }
        Ok(snapshot)
    }

    /// Remove and return one lane, oldest first.
    pub fn drain(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        let drained = self.lanes.take_lane(session, priority)?;
        tracing::debug!(%session, %priority, count = drained.len(), "lane drained");
        Ok(drained)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
