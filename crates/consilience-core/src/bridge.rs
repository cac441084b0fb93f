//! Decision Bridge: the core's only door to the Decision Service.
//!
//! [`DecisionService`] is the collaborator contract; [`DecisionBridge`] wraps
//! it with per-call deadlines and the fallback policy of each capability:
//!
//! | capability             | on timeout / malformed / unreachable            |
//! |------------------------|-------------------------------------------------|
//! | `classify_trigger`     | retried while unreachable, then `Err` (trigger dropped) |
//! | `verify_followup`      | `false` (fail closed)                            |
//! | `detect_factual_error` | `None` (nothing to report)                       |
//! | `detect_stuck_signal`  | `None` (nothing to report)                       |
//! | `compare_issues`       | `Err`, the ledger treats it as "similar"         |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BridgeConfig;
use crate::error::{ConsilienceError, Result};
use crate::types::{AnalysisFinding, ContextSnapshot, Decision, FollowUpContext, TriggerSignal};

pub const CLASSIFY_TRIGGER: &str = "classify_trigger";
pub const VERIFY_FOLLOWUP: &str = "verify_followup";
pub const DETECT_FACTUAL_ERROR: &str = "detect_factual_error";
pub const DETECT_STUCK_SIGNAL: &str = "detect_stuck_signal";
pub const COMPARE_ISSUES: &str = "compare_issues";

/// The external classifier/generator, invoked over text.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn classify_trigger(
        &self,
        trigger: &TriggerSignal,
        context: &ContextSnapshot,
        followup: Option<&FollowUpContext>,
    ) -> Result<Decision>;

    async fn verify_followup(
        &self,
        message_text: &str,
        speaker: &str,
        last_response: &str,
    ) -> Result<bool>;

    async fn detect_factual_error(&self, context: &ContextSnapshot)
        -> Result<Option<AnalysisFinding>>;

    async fn detect_stuck_signal(&self, context: &ContextSnapshot)
        -> Result<Option<AnalysisFinding>>;

    async fn compare_issues(&self, first: &str, second: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct DecisionBridge {
    service: Arc<dyn DecisionService>,
    call_timeout: Duration,
    classify_retries: u32,
    retry_backoff: Duration,
}

impl DecisionBridge {
    pub fn new(service: Arc<dyn DecisionService>, config: &BridgeConfig) -> Self {
        Self {
            service,
            call_timeout: config.call_timeout(),
            classify_retries: config.classify_retries,
            retry_backoff: config.retry_backoff(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Classify a trigger. Only an unreachable service is retried, and only
    /// within the configured budget; timeouts and malformed replies end it.
    pub async fn classify_trigger(
        &self,
        trigger: &TriggerSignal,
        context: &ContextSnapshot,
        followup: Option<&FollowUpContext>,
    ) -> Result<Decision> {
        let mut attempt = 0;
        loop {
            let result = self
                .deadline(
                    CLASSIFY_TRIGGER,
                    self.service.classify_trigger(trigger, context, followup),
                )
                .await;
            match result {
                Err(ConsilienceError::CollaboratorUnavailable { .. })
                    if attempt < self.classify_retries =>
                {
                    attempt += 1;
                    tracing::debug!(attempt, "classify_trigger unreachable, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    pub async fn verify_followup(&self, message_text: &str, speaker: &str, last_response: &str) -> bool {
        let call = self
            .service
            .verify_followup(message_text, speaker, last_response);
        match self.deadline(VERIFY_FOLLOWUP, call).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "follow-up verification failed; treating as fresh topic");
                false
            }
        }
    }

    pub async fn detect_factual_error(&self, context: &ContextSnapshot) -> Option<AnalysisFinding> {
        let call = self.service.detect_factual_error(context);
        self.nothing_on_failure(DETECT_FACTUAL_ERROR, call).await
    }

    pub async fn detect_stuck_signal(&self, context: &ContextSnapshot) -> Option<AnalysisFinding> {
        let call = self.service.detect_stuck_signal(context);
        self.nothing_on_failure(DETECT_STUCK_SIGNAL, call).await
    }

    pub async fn compare_issues(&self, first: &str, second: &str) -> Result<bool> {
        self.deadline(COMPARE_ISSUES, self.service.compare_issues(first, second))
            .await
    }

    async fn nothing_on_failure<F>(&self, capability: &'static str, call: F) -> Option<AnalysisFinding>
    where
        F: Future<Output = Result<Option<AnalysisFinding>>>,
    {
        match self.deadline(capability, call).await {
            Ok(finding) => finding,
            Err(e) => {
                tracing::debug!(capability, error = %e, "analysis check degraded to nothing-to-report");
                None
            }
        }
    }

    async fn deadline<T, F>(&self, capability: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ConsilienceError::CollaboratorTimeout {
                capability,
                after: self.call_timeout,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
