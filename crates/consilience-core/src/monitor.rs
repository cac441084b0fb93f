//! Background Monitor (Task 2).
//!
//! The first tick lands as the startup delay ends, then one every `interval`.
//! Each tick runs the factual-error check, then the stuck check, each
//! producing at most one finding. A check (detection plus specialist fan-out)
//! is bounded by `check_timeout`; the lane write after it is not.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::bridge::DecisionBridge;
use crate::config::{MonitorConfig, ResponseTexts};
use crate::session::SessionState;
use crate::specialist::SpecialistDispatcher;
use crate::types::{
    AnalysisFinding, ContextSnapshot, FindingKind, Priority, QueuedResponse, TaskType,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// Still inside the startup delay.
    Warmup,
    /// Nothing has been said yet.
    Idle,
    ContextUnavailable(String),
    Checked(Vec<CheckOutcome>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub kind: FindingKind,
    pub result: CheckResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    NothingToReport,
    Admitted(Priority),
    Duplicate,
    NoPerspectives,
    TimedOut,
    Rejected(String),
}

struct Prepared {
    finding: AnalysisFinding,
    domains: Vec<String>,
    specialist_text: String,
}

pub struct BackgroundMonitor {
    session: Arc<SessionState>,
    bridge: DecisionBridge,
    specialists: SpecialistDispatcher,
    startup_delay: Duration,
    interval: Duration,
    check_timeout: Duration,
    texts: ResponseTexts,
}

impl BackgroundMonitor {
    pub fn new(
        session: Arc<SessionState>,
        bridge: DecisionBridge,
        specialists: SpecialistDispatcher,
        config: &MonitorConfig,
        texts: ResponseTexts,
    ) -> Self {
        Self {
            session,
            bridge,
            specialists,
            startup_delay: config.startup_delay(),
            interval: config.interval(),
            check_timeout: config.check_timeout(),
            texts,
        }
    }

    /// Tick until the session is torn down.
    pub async fn run(self) {
        let token = self.session.cancel_token();
        let first = self.session.started_at() + self.startup_delay;
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let report = tokio::select! {
                _ = token.cancelled() => break,
                report = self.tick() => report,
            };
            tracing::debug!(session = %self.session.id(), ?report, "monitor tick");
        }
        tracing::debug!(session = %self.session.id(), "background monitor stopped");
    }

    pub async fn tick(&self) -> TickReport {
        if self.session.elapsed() < self.startup_delay {
            return TickReport::Warmup;
        }
        let context = match self.session.fetch_context().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "monitor could not fetch context");
                return TickReport::ContextUnavailable(e.to_string());
            }
        };
        if !context.has_messages() {
            return TickReport::Idle;
        }
        let context = Arc::new(context);

        let mut outcomes = Vec::with_capacity(2);
        for kind in [FindingKind::FactualError, FindingKind::StuckSignal] {
            let result = self.check(kind, context.clone()).await;
            outcomes.push(CheckOutcome { kind, result });
        }
        TickReport::Checked(outcomes)
    }

    async fn check(&self, kind: FindingKind, context: Arc<ContextSnapshot>) -> CheckResult {
        let session = self.session.id();
        match tokio::time::timeout(self.check_timeout, self.investigate(kind, context)).await {
            Ok(Ok(prepared)) => self.respond_to(prepared).await,
            Ok(Err(result)) => result,
            Err(_) => {
                tracing::warn!(%session, %kind, "finding dropped: check timed out");
                CheckResult::TimedOut
            }
        }
    }

    /// Detection, then specialists for whatever was found.
    async fn investigate(
        &self,
        kind: FindingKind,
        context: Arc<ContextSnapshot>,
    ) -> Result<Prepared, CheckResult> {
        let finding = match kind {
            FindingKind::FactualError => self.bridge.detect_factual_error(&context).await,
            FindingKind::StuckSignal => self.bridge.detect_stuck_signal(&context).await,
        }
        .ok_or(CheckResult::NothingToReport)?;

        let domains = self.specialists.select_domains(&finding.domains_needed);
        let task_type = match finding.kind {
            FindingKind::FactualError => TaskType::FactualCorrection,
            FindingKind::StuckSignal => TaskType::ProvidePerspective,
        };
        let specialist_text = self
            .specialists
            .dispatch(&domains, context.clone(), &context.active_domains, task_type)
            .await
            .ok_or_else(|| {
                tracing::debug!(session = %self.session.id(), kind = %finding.kind, "finding dropped: no perspectives");
                CheckResult::NoPerspectives
            })?;
        Ok(Prepared {
            finding,
            domains,
            specialist_text,
        })
    }

    async fn respond_to(&self, prepared: Prepared) -> CheckResult {
        let session = self.session.id();
        let Prepared {
            finding,
            domains,
            specialist_text,
        } = prepared;

        let text = assemble(&finding, &specialist_text, &self.texts);
        // background findings never use the P0 lane
        let priority = finding.priority.max(Priority::P1);
        let response = QueuedResponse::new(
            priority,
            finding.kind.into(),
            text,
            domains,
            finding.dedup_key(),
        );
        match self.session.ledger().submit(&response).await {
            Ok(true) => {
                tracing::info!(%session, kind = %finding.kind, %priority, "finding admitted");
                CheckResult::Admitted(priority)
            }
            Ok(false) => CheckResult::Duplicate,
            Err(e) => {
                tracing::warn!(%session, kind = %finding.kind, error = %e, "finding dropped");
                CheckResult::Rejected(e.to_string())
            }
        }
    }
}

/// Error findings lead with the correction; stuck findings are the specialist
/// text alone.
pub fn assemble(finding: &AnalysisFinding, specialist_text: &str, texts: &ResponseTexts) -> String {
    match finding.kind {
        FindingKind::FactualError => {
            let corrected = finding
                .correction
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(&finding.description);
            format!("{} {}\n\n{}", texts.correction_prefix, corrected, specialist_text)
        }
        FindingKind::StuckSignal => specialist_text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
