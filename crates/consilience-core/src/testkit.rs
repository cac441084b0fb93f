//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::bridge::DecisionService;
use crate::error::{ConsilienceError, Result};
use crate::specialist::{PerspectiveRequest, Specialist};
use crate::types::{
    AnalysisFinding, ContextSnapshot, ConversationMessage, Decision, DecisionPath, FindingKind,
    FollowUpContext, Priority, Severity, TaskType, TriggerSignal,
};

/// How a scripted collaborator answers one call.
#[derive(Debug, Clone)]
pub enum Script<T> {
    Reply(T),
    Unavailable,
    Malformed,
    Hang,
    Delay(Duration, T),
}

impl<T: Clone> Script<T> {
    pub async fn play(&self, capability: &'static str) -> Result<T> {
        match self {
            Script::Reply(v) => Ok(v.clone()),
            Script::Unavailable => Err(ConsilienceError::unavailable(capability, "connection refused")),
            Script::Malformed => Err(ConsilienceError::malformed(capability, "not json")),
            Script::Hang => std::future::pending().await,
            Script::Delay(after, v) => {
                tokio::time::sleep(*after).await;
                Ok(v.clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedService
// ---------------------------------------------------------------------------

pub struct ScriptedService {
    classify: Mutex<VecDeque<Script<Decision>>>,
    followup: Mutex<Script<bool>>,
    error_check: Mutex<Script<Option<AnalysisFinding>>>,
    stuck_check: Mutex<Script<Option<AnalysisFinding>>>,
    compare_override: Mutex<Option<Script<bool>>>,
    similar_keywords: Mutex<Vec<String>>,
    compare_delay: Mutex<Duration>,
    pub classify_calls: Arc<AtomicUsize>,
    pub compare_calls: Arc<AtomicUsize>,
    pub analysis_calls: Arc<AtomicUsize>,
    /// `(message_text, speaker, last_response)` per verification call.
    pub followup_requests: Arc<Mutex<Vec<(String, String, String)>>>,
    /// Follow-up context handed to each classification call.
    pub classify_followups: Arc<Mutex<Vec<Option<FollowUpContext>>>>,
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self {
            classify: Mutex::new(VecDeque::new()),
            followup: Mutex::new(Script::Reply(false)),
            error_check: Mutex::new(Script::Reply(None)),
            stuck_check: Mutex::new(Script::Reply(None)),
            compare_override: Mutex::new(None),
            similar_keywords: Mutex::new(Vec::new()),
            compare_delay: Mutex::new(Duration::ZERO),
            classify_calls: Arc::new(AtomicUsize::new(0)),
            compare_calls: Arc::new(AtomicUsize::new(0)),
            analysis_calls: Arc::new(AtomicUsize::new(0)),
            followup_requests: Arc::new(Mutex::new(Vec::new())),
            classify_followups: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ScriptedService {
    /// Queue the answer for the next classification; an empty queue answers path A.
    pub fn push_classify(&self, script: Script<Decision>) {
        self.classify.lock().unwrap().push_back(script);
    }

    pub fn set_followup(&self, script: Script<bool>) {
        *self.followup.lock().unwrap() = script;
    }

    pub fn set_error_check(&self, script: Script<Option<AnalysisFinding>>) {
        *self.error_check.lock().unwrap() = script;
    }

    pub fn set_stuck_check(&self, script: Script<Option<AnalysisFinding>>) {
        *self.stuck_check.lock().unwrap() = script;
    }

    /// Every comparison answers with `script`, ignoring keywords.
    pub fn set_compare(&self, script: Script<bool>) {
        *self.compare_override.lock().unwrap() = Some(script);
    }

    /// Two texts that both mention `keyword` are judged similar.
    pub fn similar_when(&self, keyword: &str) {
        self.similar_keywords
            .lock()
            .unwrap()
            .push(keyword.to_lowercase());
    }

    pub fn set_compare_delay(&self, delay: Duration) {
        *self.compare_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl DecisionService for ScriptedService {
    async fn classify_trigger(
        &self,
        _trigger: &TriggerSignal,
        _context: &ContextSnapshot,
        followup: Option<&FollowUpContext>,
    ) -> Result<Decision> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.classify_followups
            .lock()
            .unwrap()
            .push(followup.cloned());
        let script = self
            .classify
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Reply(decision(DecisionPath::Ignore)));
        script.play(crate::bridge::CLASSIFY_TRIGGER).await
    }

    async fn verify_followup(&self, message_text: &str, speaker: &str, last_response: &str) -> Result<bool> {
        self.followup_requests.lock().unwrap().push((
            message_text.to_string(),
            speaker.to_string(),
            last_response.to_string(),
        ));
        let script = self.followup.lock().unwrap().clone();
        script.play(crate::bridge::VERIFY_FOLLOWUP).await
    }

    async fn detect_factual_error(&self, _context: &ContextSnapshot) -> Result<Option<AnalysisFinding>> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.error_check.lock().unwrap().clone();
        script.play(crate::bridge::DETECT_FACTUAL_ERROR).await
    }

    async fn detect_stuck_signal(&self, _context: &ContextSnapshot) -> Result<Option<AnalysisFinding>> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.stuck_check.lock().unwrap().clone();
        script.play(crate::bridge::DETECT_STUCK_SIGNAL).await
    }

    async fn compare_issues(&self, first: &str, second: &str) -> Result<bool> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.compare_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let override_script = self.compare_override.lock().unwrap().clone();
        if let Some(script) = override_script {
            return script.play(crate::bridge::COMPARE_ISSUES).await;
        }
        let (a, b) = (first.to_lowercase(), second.to_lowercase());
        let keywords = self.similar_keywords.lock().unwrap().clone();
        Ok(a == b || keywords.iter().any(|k| a.contains(k) && b.contains(k)))
    }
}

// ---------------------------------------------------------------------------
// ScriptedSpecialist
// ---------------------------------------------------------------------------

/// Answers `"{domain} view"` unless a domain is scripted otherwise.
#[derive(Default)]
pub struct ScriptedSpecialist {
    scripts: Mutex<HashMap<String, Script<String>>>,
    pub requested: Arc<Mutex<Vec<String>>>,
    pub task_types: Arc<Mutex<Vec<TaskType>>>,
}

impl ScriptedSpecialist {
    pub fn script(&self, domain: &str, script: Script<String>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(domain.to_string(), script);
    }
}

#[async_trait]
impl Specialist for ScriptedSpecialist {
    async fn generate_perspective(&self, request: &PerspectiveRequest) -> Result<String> {
        self.requested.lock().unwrap().push(request.domain.clone());
        self.task_types.lock().unwrap().push(request.task_type);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.domain)
            .cloned()
            .unwrap_or_else(|| Script::Reply(format!("{} view", request.domain)));
        script.play("generate_perspective").await
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn trigger(text: &str) -> TriggerSignal {
    TriggerSignal {
        trigger_type: "explicit_request".into(),
        message_ref: None,
        triggering_text: text.into(),
        speaker: "Ana".into(),
        timestamp: Utc::now(),
        potential_follow_up: false,
    }
}

pub fn decision(path: DecisionPath) -> Decision {
    Decision {
        path,
        urgency: 5,
        needs_response: true,
        reasoning: "asked directly".into(),
        active_domains: vec![],
    }
}

pub fn respond(domains: &[&str]) -> Decision {
    decision(DecisionPath::Respond {
        missing_domains: domains.iter().map(|d| d.to_string()).collect(),
        task_type: TaskType::ProvidePerspective,
    })
}

pub fn finding(kind: FindingKind, description: &str, priority: Priority) -> AnalysisFinding {
    AnalysisFinding {
        kind,
        description: description.into(),
        issue_description: description.into(),
        severity: Severity::High,
        domains_needed: vec!["Biology".into()],
        priority,
        correction: None,
    }
}

pub fn message(n: u64) -> ConversationMessage {
    ConversationMessage {
        message_number: n,
        speaker: "Ana".into(),
        text: format!("message {n}"),
        timestamp: Utc::now(),
        domains: vec![],
    }
}
