//! Session registry.
//!
//! [`Orchestrator`] owns one [`SessionState`] per session plus the two tasks
//! that share it: the trigger controller (fed by an mpsc channel) and the
//! background monitor. Sessions start implicitly on first use and share no
//! mutable state with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{DecisionBridge, DecisionService};
use crate::config::OrchestratorConfig;
use crate::dedup::DedupLedger;
use crate::error::{ConsilienceError, Result};
use crate::monitor::BackgroundMonitor;
use crate::queue::{LaneSnapshot, PriorityQueueStore};
use crate::session::SessionState;
use crate::specialist::{Specialist, SpecialistDispatcher};
use crate::storage::{ConversationStore, LaneStore};
use crate::trigger::{PendingTrigger, TriggerController};
use crate::types::{
    ConversationMessage, DeliveredResponse, Priority, QueuedResponse, SessionId, TriggerSignal,
};

const TRIGGER_BACKLOG: usize = 64;

/// The external collaborators the core is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub decisions: Arc<dyn DecisionService>,
    pub specialist: Arc<dyn Specialist>,
    pub conversation: Arc<dyn ConversationStore>,
    pub lanes: Arc<dyn LaneStore>,
}

struct SessionHandle {
    state: Arc<SessionState>,
    triggers: mpsc::Sender<PendingTrigger>,
    trigger_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    bridge: DecisionBridge,
    specialists: SpecialistDispatcher,
    conversation: Arc<dyn ConversationStore>,
    queue: Arc<PriorityQueueStore>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        let bridge = DecisionBridge::new(collaborators.decisions, &config.bridge);
        let specialists = SpecialistDispatcher::new(collaborators.specialist, &config.specialists);
        let queue = Arc::new(PriorityQueueStore::new(collaborators.lanes, &config.queue));
        Self {
            config,
            bridge,
            specialists,
            conversation: collaborators.conversation,
            queue,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Return the live session, starting it (and its two tasks) if needed.
    /// Must be called inside a Tokio runtime.
    pub fn ensure_session(&self, session: &str) -> Result<Arc<SessionState>> {
        let id = SessionId::parse(session)?;
        let mut sessions = self.lock()?;
        if let Some(handle) = sessions.get(&id) {
            return Ok(handle.state.clone());
        }

        let ledger = DedupLedger::new(
            id.clone(),
            self.bridge.clone(),
            self.queue.clone(),
            &self.config.dedup,
        );
        let state = Arc::new(SessionState::new(
            id.clone(),
            ledger,
            self.queue.clone(),
            self.conversation.clone(),
            self.config.bridge.call_timeout(),
        ));

        let (tx, rx) = mpsc::channel(TRIGGER_BACKLOG);
        let controller = TriggerController::new(
            state.clone(),
            self.bridge.clone(),
            self.specialists.clone(),
            &self.config.trigger,
            self.config.responses.clone(),
        );
        let monitor = BackgroundMonitor::new(
            state.clone(),
            self.bridge.clone(),
            self.specialists.clone(),
            &self.config.monitor,
            self.config.responses.clone(),
        );
        let trigger_task = tokio::spawn(controller.run(rx));
        let monitor_task = tokio::spawn(monitor.run());

        tracing::info!(session = %id, "session started");
        sessions.insert(
            id,
            SessionHandle {
                state: state.clone(),
                triggers: tx,
                trigger_task,
                monitor_task,
            },
        );
        Ok(state)
    }

    /// Hand a trigger to the session's controller. Returns once it is queued
    /// for processing, not once it is answered.
    pub async fn submit_trigger(&self, session: &str, trigger: TriggerSignal) -> Result<()> {
        let state = self.ensure_session(session)?;
        let sender = self
            .lock()?
            .get(state.id())
            .map(|h| h.triggers.clone())
            .ok_or_else(|| ConsilienceError::SessionClosed(session.to_string()))?;
        let pending = PendingTrigger {
            signal: trigger,
            arrivals_at_submit: state.arrivals(),
        };
        sender
            .send(pending)
            .await
            .map_err(|_| ConsilienceError::SessionClosed(session.to_string()))
    }

    pub async fn record_message(&self, session: &str, message: ConversationMessage) -> Result<()> {
        let state = self.ensure_session(session)?;
        self.conversation.append_message(state.id(), message).await?;
        state.note_arrival();
        Ok(())
    }

    pub async fn set_domains(
        &self,
        session: &str,
        active: Vec<String>,
        missing: Vec<String>,
    ) -> Result<()> {
        let state = self.ensure_session(session)?;
        self.conversation.set_domains(state.id(), active, missing).await
    }

    pub async fn set_summary(&self, session: &str, summary: String) -> Result<()> {
        let state = self.ensure_session(session)?;
        self.conversation.set_summary(state.id(), summary).await
    }

    /// Delivery hook: the response joins the session's history and keeps
    /// suppressing repeats for the dedup window.
    pub async fn mark_delivered(&self, session: &str, response: &QueuedResponse) -> Result<()> {
        let state = self.ensure_session(session)?;
        self.conversation
            .record_delivered(
                state.id(),
                DeliveredResponse {
                    text: response.text.clone(),
                    issue_description: response.issue_description.clone(),
                    priority: response.priority,
                    delivered_at: chrono::Utc::now(),
                },
            )
            .await?;
        if !response.issue_description.trim().is_empty() {
            state
                .ledger()
                .remember(&response.issue_description, response.priority)?;
        }
        Ok(())
    }

    pub fn peek_all(&self, session: &str) -> Result<LaneSnapshot> {
        self.queue.peek_all(&SessionId::parse(session)?)
    }

    pub fn drain(&self, session: &str, priority: Priority) -> Result<Vec<QueuedResponse>> {
        self.queue.drain(&SessionId::parse(session)?, priority)
    }

    pub fn active_sessions(&self) -> Result<Vec<SessionId>> {
        let mut ids: Vec<SessionId> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Cancel both tasks of a session at their next suspension point.
    pub async fn teardown(&self, session: &str) -> Result<()> {
        let id = SessionId::parse(session)?;
        let removed = self.lock()?.remove(&id);
        let Some(handle) = removed else {
            return Ok(());
        };
        handle.state.cancel();
        join_quietly(&id, handle.trigger_task).await;
        join_quietly(&id, handle.monitor_task).await;
        tracing::info!(session = %id, "session torn down");
        Ok(())
    }

    /// Let every session finish the triggers already submitted, then stop
    /// the monitors.
    pub async fn shutdown(&self) -> Result<()> {
        let handles: Vec<(SessionId, SessionHandle)> = self.lock()?.drain().collect();
        for (id, handle) in handles {
            let SessionHandle {
                state,
                triggers,
                trigger_task,
                monitor_task,
            } = handle;
            drop(triggers);
            join_quietly(&id, trigger_task).await;
            state.cancel();
            join_quietly(&id, monitor_task).await;
            tracing::debug!(session = %id, "session closed");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionHandle>>> {
        self.sessions
            .lock()
            .map_err(|_| ConsilienceError::Storage("session registry lock poisoned".into()))
    }
}

async fn join_quietly(session: &SessionId, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::error!(%session, error = %e, "session task panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
