use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ConversationStore, LaneStore, HISTORY_LIMIT, RECENT_MESSAGE_LIMIT};
use crate::error::{ConsilienceError, Result};
use crate::types::{
    ConversationMessage, ContextSnapshot, DeliveredResponse, Priority, QueuedResponse, SessionId,
};

#[derive(Default)]
struct SessionRecord {
    summary: String,
    recent: VecDeque<ConversationMessage>,
    delivered: VecDeque<DeliveredResponse>,
    active_domains: Vec<String>,
    missing_domains: Vec<String>,
    lanes: [VecDeque<QueuedResponse>; 4],
}

/// In-process Storage Layer; both conversation context and lanes.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionRecord>>> {
        self.sessions
            .lock()
            .map_err(|_| ConsilienceError::Storage("memory store lock poisoned".into()))
    }

    fn with_record<T>(&self, session: &SessionId, f: impl FnOnce(&mut SessionRecord) -> T) -> Result<T> {
        let mut sessions = self.lock()?;
        let record = sessions.entry(session.clone()).or_default();
        Ok(f(record))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_context_snapshot(&self, session: &SessionId) -> Result<ContextSnapshot> {
        let sessions = self.lock()?;
        let Some(record) = sessions.get(session) else {
            return Ok(ContextSnapshot::default());
        };
        Ok(ContextSnapshot {
            summary: record.summary.clone(),
            recent_messages: record.recent.iter().cloned().collect(),
            consilience_history: record.delivered.iter().cloned().collect(),
            active_domains: record.active_domains.clone(),
            missing_domains: record.missing_domains.clone(),
        })
    }

    async fn append_message(&self, session: &SessionId, message: ConversationMessage) -> Result<()> {
        self.with_record(session, |record| {
            record.recent.push_back(message);
            while record.recent.len() > RECENT_MESSAGE_LIMIT {
                record.recent.pop_front();
            }
        })
    }

    async fn record_delivered(&self, session: &SessionId, response: DeliveredResponse) -> Result<()> {
        self.with_record(session, |record| {
            record.delivered.push_back(response);
            while record.delivered.len() > HISTORY_LIMIT {
                record.delivered.pop_front();
            }
        })
    }

    async fn set_domains(
        &self,
        session: &SessionId,
        active: Vec<String>,
        missing: Vec<String>,
    ) -> Result<()> {
        self.with_record(session, |record| {
            record.active_domains = active;
            record.missing_domains = missing;
        })
    }

    async fn set_summary(&self, session: &SessionId, summary: String) -> Result<()> {
        self.with_record(session, |record| record.summary = summary)
    }
}

impl LaneStore for MemoryStore {
    fn append(&self, session: &SessionId, response: &QueuedResponse) -> Result<()> {
        self.with_record(session, |record| {
            record.lanes[response.priority.index()].push_back(response.clone())
        })
    }

    fn read_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        let sessions = self.lock()?;
        Ok(sessions
            .get(session)
            .map(|r| r.lanes[priority.index()].iter().cloned().collect())
            .unwrap_or_default())
    }

    fn take_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        self.with_record(session, |record| {
            record.lanes[priority.index()].drain(..).collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
