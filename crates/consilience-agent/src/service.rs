//! [`DecisionService`] and [`Specialist`] backed by [`ChatClient`].

use async_trait::async_trait;
use consilience_core::bridge::{
    DecisionService, CLASSIFY_TRIGGER, COMPARE_ISSUES, DETECT_FACTUAL_ERROR, DETECT_STUCK_SIGNAL,
    VERIFY_FOLLOWUP,
};
use consilience_core::config::LlmConfig;
use consilience_core::specialist::{PerspectiveRequest, Specialist};
use consilience_core::types::{
    AnalysisFinding, ContextSnapshot, Decision, FollowUpContext, TriggerSignal,
};
use consilience_core::ConsilienceError;

use crate::client::ChatClient;
use crate::error::AgentError;
use crate::prompts;
use crate::types::{
    most_severe, ChatRequest, DecisionReply, DetectionReply, ErrorVerdict, FollowUpReply,
    SimilarityReply, StuckVerdict,
};

const GENERATE_PERSPECTIVE: &str = "generate_perspective";

/// Classification runs on the decision model; the cheaper yes/no checks and
/// background analysis run on the analysis model.
#[derive(Clone)]
pub struct LlmDecisionService {
    client: ChatClient,
    decision_model: String,
    analysis_model: String,
}

impl LlmDecisionService {
    pub fn new(client: ChatClient, config: &LlmConfig) -> Self {
        Self {
            client,
            decision_model: config.decision_model.clone(),
            analysis_model: config.analysis_model.clone(),
        }
    }

    fn verdict(&self, prompt: String) -> ChatRequest {
        ChatRequest::user(&self.analysis_model, prompt)
            .json()
            .temperature(0.2)
            .max_tokens(100)
    }

    fn analysis(&self, prompt: String) -> ChatRequest {
        ChatRequest::user(&self.analysis_model, prompt)
            .json()
            .temperature(0.3)
            .max_tokens(500)
    }
}

#[async_trait]
impl DecisionService for LlmDecisionService {
    async fn classify_trigger(
        &self,
        trigger: &TriggerSignal,
        context: &ContextSnapshot,
        followup: Option<&FollowUpContext>,
    ) -> Result<Decision, ConsilienceError> {
        let request = ChatRequest::user(
            &self.decision_model,
            prompts::classify(trigger, context, followup),
        )
        .json()
        .temperature(0.3)
        .max_tokens(500);
        let reply: DecisionReply = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| e.into_core(CLASSIFY_TRIGGER))?;
        let decision = Decision::try_from(reply).map_err(|e| e.into_core(CLASSIFY_TRIGGER))?;
        tracing::debug!(
            path = decision.path.label(),
            urgency = decision.urgency,
            "trigger classified"
        );
        Ok(decision)
    }

    async fn verify_followup(
        &self,
        message_text: &str,
        speaker: &str,
        last_response: &str,
    ) -> Result<bool, ConsilienceError> {
        let request = self.verdict(prompts::verify_followup(message_text, speaker, last_response));
        let reply: FollowUpReply = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| e.into_core(VERIFY_FOLLOWUP))?;
        Ok(reply.is_follow_up)
    }

    async fn detect_factual_error(
        &self,
        context: &ContextSnapshot,
    ) -> Result<Option<AnalysisFinding>, ConsilienceError> {
        let request = self.analysis(prompts::detect_factual_error(context));
        let reply: DetectionReply<ErrorVerdict> = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| e.into_core(DETECT_FACTUAL_ERROR))?;
        Ok(most_severe(
            reply.into_vec().into_iter().filter_map(ErrorVerdict::into_finding),
        ))
    }

    async fn detect_stuck_signal(
        &self,
        context: &ContextSnapshot,
    ) -> Result<Option<AnalysisFinding>, ConsilienceError> {
        let request = self.analysis(prompts::detect_stuck_signal(context));
        let reply: DetectionReply<StuckVerdict> = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| e.into_core(DETECT_STUCK_SIGNAL))?;
        Ok(most_severe(
            reply.into_vec().into_iter().filter_map(StuckVerdict::into_finding),
        ))
    }

    async fn compare_issues(&self, first: &str, second: &str) -> Result<bool, ConsilienceError> {
        let request = self.verdict(prompts::compare_issues(first, second));
        let reply: SimilarityReply = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| e.into_core(COMPARE_ISSUES))?;
        Ok(reply.are_similar)
    }
}

/// One model plays every domain; the domain is set in the prompt.
#[derive(Clone)]
pub struct LlmSpecialist {
    client: ChatClient,
    model: String,
}

impl LlmSpecialist {
    pub fn new(client: ChatClient, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.specialist_model.clone(),
        }
    }
}

#[async_trait]
impl Specialist for LlmSpecialist {
    async fn generate_perspective(
        &self,
        request: &PerspectiveRequest,
    ) -> Result<String, ConsilienceError> {
        let chat = ChatRequest::user(&self.model, prompts::perspective(request))
            .temperature(0.7)
            .max_tokens(300);
        let text = self
            .client
            .complete(&chat)
            .await
            .map_err(|e| e.into_core(GENERATE_PERSPECTIVE))?;
        if text.trim().is_empty() {
            return Err(AgentError::EmptyReply.into_core(GENERATE_PERSPECTIVE));
        }
        Ok(text)
    }
}
