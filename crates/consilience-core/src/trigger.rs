//! Immediate-Trigger Controller (Task 1).
//!
//! Per trigger:
//!
//! ```text
//! RECEIVED → WAITING_FOR_CONTEXT → (FOLLOWUP_CHECK) → DECIDING → (SPECIALIST_FANOUT) → ENQUEUED | DROPPED
//! ```
//!
//! Everything this controller enqueues goes to P0 and skips the dedup
//! ledger: the speaker asked directly. Clarification requests carry no issue
//! description, so they never count as a duplicate of a finding.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::bridge::DecisionBridge;
use crate::config::{ResponseTexts, TriggerConfig};
use crate::session::SessionState;
use crate::specialist::SpecialistDispatcher;
use crate::types::{
    Decision, DecisionPath, FollowUpContext, Priority, QueuedResponse, ResponseOrigin,
    TriggerSignal,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Enqueued {
        origin: ResponseOrigin,
        text: String,
    },
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// Path A: keep listening.
    NothingToSay,
    NoPerspectives,
    ContextUnavailable(String),
    ClassificationFailed(String),
    QueueWrite(String),
    Cancelled,
}

/// A trigger as it waits in the session's backlog, with the arrival count
/// observed when it was submitted.
#[derive(Debug, Clone)]
pub struct PendingTrigger {
    pub signal: TriggerSignal,
    pub arrivals_at_submit: u64,
}

pub struct TriggerController {
    session: Arc<SessionState>,
    bridge: DecisionBridge,
    specialists: SpecialistDispatcher,
    wait: Duration,
    message_count: u64,
    texts: ResponseTexts,
}

impl TriggerController {
    pub fn new(
        session: Arc<SessionState>,
        bridge: DecisionBridge,
        specialists: SpecialistDispatcher,
        config: &TriggerConfig,
        texts: ResponseTexts,
    ) -> Self {
        Self {
            session,
            bridge,
            specialists,
            wait: config.wait(),
            message_count: config.message_count,
            texts,
        }
    }

    /// Consume triggers one at a time until the channel closes or the
    /// session is torn down.
    pub async fn run(self, mut triggers: mpsc::Receiver<PendingTrigger>) {
        let token = self.session.cancel_token();
        loop {
            let trigger = tokio::select! {
                _ = token.cancelled() => break,
                next = triggers.recv() => match next {
                    Some(t) => t,
                    None => break,
                },
            };
            self.process_from(trigger.signal, trigger.arrivals_at_submit)
                .await;
        }
        tracing::debug!(session = %self.session.id(), "trigger controller stopped");
    }

    /// Drive one trigger to `ENQUEUED` or `DROPPED`, counting new messages
    /// from now.
    pub async fn process(&self, trigger: TriggerSignal) -> TriggerOutcome {
        let arrivals = self.session.arrivals();
        self.process_from(trigger, arrivals).await
    }

    async fn process_from(&self, trigger: TriggerSignal, arrivals_at_submit: u64) -> TriggerOutcome {
        let session = self.session.id().clone();
        let token = self.session.cancel_token();
        // Correlates the debug lines of one trigger's state machine.
        let span = tracing::debug_span!("trigger", id = %Uuid::new_v4());
        let outcome = tokio::select! {
            _ = token.cancelled() => TriggerOutcome::Dropped(DropReason::Cancelled),
            outcome = self.handle(&trigger, arrivals_at_submit).instrument(span) => outcome,
        };
        match &outcome {
            TriggerOutcome::Enqueued { origin, .. } => {
                tracing::info!(%session, ?origin, text = %trigger.triggering_text, "trigger answered");
            }
            TriggerOutcome::Dropped(DropReason::NothingToSay) => {
                tracing::info!(%session, text = %trigger.triggering_text, "trigger needs no response");
            }
            TriggerOutcome::Dropped(reason) => {
                tracing::warn!(%session, ?reason, text = %trigger.triggering_text, "trigger dropped");
            }
        }
        outcome
    }

    async fn handle(&self, trigger: &TriggerSignal, arrivals_at_submit: u64) -> TriggerOutcome {
        self.wait_for_context(trigger, arrivals_at_submit).await;

        let context = match self.session.fetch_context().await {
            Ok(c) => c,
            Err(e) => return TriggerOutcome::Dropped(DropReason::ContextUnavailable(e.to_string())),
        };

        let followup = self.check_followup(trigger, &context.consilience_history).await;

        let decision = match self
            .bridge
            .classify_trigger(trigger, &context, followup.as_ref())
            .await
        {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(
                    session = %self.session.id(),
                    error = %e,
                    "trigger classification failed"
                );
                return TriggerOutcome::Dropped(DropReason::ClassificationFailed(e.to_string()));
            }
        };
        tracing::debug!(
            session = %self.session.id(),
            path = decision.path.label(),
            urgency = decision.urgency,
            "trigger classified"
        );

        match &decision.path {
            DecisionPath::Ignore => TriggerOutcome::Dropped(DropReason::NothingToSay),
            DecisionPath::Clarify => {
                let text = self.texts.clarification.clone();
                self.enqueue_clarification(text).await
            }
            DecisionPath::Respond {
                missing_domains, ..
            } if missing_domains.is_empty() => {
                let text = self.texts.unclear_question.clone();
                self.enqueue_clarification(text).await
            }
            DecisionPath::Respond {
                missing_domains,
                task_type,
            } => {
                let domains = self.specialists.select_domains(missing_domains);
                let text = self
                    .specialists
                    .dispatch(
                        &domains,
                        Arc::new(context),
                        &decision.active_domains,
                        *task_type,
                    )
                    .await;
                match text {
                    Some(text) => {
                        let issue = issue_description(&decision, trigger);
                        self.enqueue_with_issue(ResponseOrigin::Trigger, text, domains, issue)
                            .await
                    }
                    None => TriggerOutcome::Dropped(DropReason::NoPerspectives),
                }
            }
        }
    }

    /// Resolves on whichever comes first: the wait elapses, or enough
    /// messages are recorded after the trigger was submitted. Message numbers
    /// play no part; only arrivals count. Timer-only when the trigger does
    /// not name its message.
    async fn wait_for_context(&self, trigger: &TriggerSignal, arrivals_at_submit: u64) {
        let timer = tokio::time::sleep(self.wait);
        if trigger.message_ref.is_none() {
            timer.await;
            return;
        }
        let target = arrivals_at_submit.saturating_add(self.message_count);
        let mut arrivals = self.session.subscribe_arrivals();
        tokio::select! {
            _ = timer => {
                tracing::debug!(session = %self.session.id(), "context wait ended by timer");
            }
            _ = arrivals.wait_for(|count| *count >= target) => {
                tracing::debug!(session = %self.session.id(), "context wait ended by message count");
            }
        }
    }

    /// Fail closed: no prior response or no positive verdict means a fresh topic.
    async fn check_followup(
        &self,
        trigger: &TriggerSignal,
        history: &[crate::types::DeliveredResponse],
    ) -> Option<FollowUpContext> {
        if !trigger.potential_follow_up {
            return None;
        }
        let last = history.last()?;
        let verified = self
            .bridge
            .verify_followup(&trigger.triggering_text, &trigger.speaker, &last.text)
            .await;
        verified.then(|| FollowUpContext {
            last_response: last.text.clone(),
        })
    }

    async fn enqueue_clarification(&self, text: String) -> TriggerOutcome {
        self.enqueue_with_issue(ResponseOrigin::Clarification, text, vec![], String::new())
            .await
    }

    async fn enqueue_with_issue(
        &self,
        origin: ResponseOrigin,
        text: String,
        domains: Vec<String>,
        issue: String,
    ) -> TriggerOutcome {
        let response = QueuedResponse::new(Priority::P0, origin, text.clone(), domains, issue);
        match self.session.queue().enqueue(self.session.id(), &response).await {
            Ok(()) => TriggerOutcome::Enqueued { origin, text },
            Err(e) => TriggerOutcome::Dropped(DropReason::QueueWrite(e.to_string())),
        }
    }
}

fn issue_description(decision: &Decision, trigger: &TriggerSignal) -> String {
    if decision.reasoning.trim().is_empty() {
        trigger.triggering_text.clone()
    } else {
        decision.reasoning.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
