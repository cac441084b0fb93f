use consilience_core::types::{
    AnalysisFinding, Decision, DecisionPath, FindingKind, Priority, Severity, TaskType,
};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

// ─── Chat completions wire format ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    /// Single user turn.
    pub fn user(model: &str, prompt: String) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: prompt,
            }],
            temperature: None,
            max_completion_tokens: None,
            response_format: None,
        }
    }

    /// Ask for a JSON object reply.
    pub fn json(mut self) -> Self {
        self.response_format = Some(ResponseFormat {
            kind: "json_object".into(),
        });
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_completion_tokens = Some(n);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.message.content.trim())
            .filter(|t| !t.is_empty())
    }
}

// ─── Model verdicts ───────────────────────────────────────────────────────

/// Reply to the trigger-classification prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionReply {
    pub decision_path: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub active_domains: Vec<String>,
    #[serde(default)]
    pub missing_domains: Vec<String>,
    #[serde(default)]
    pub urgency: u8,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub task_type: Option<String>,
}

impl TryFrom<DecisionReply> for Decision {
    type Error = AgentError;

    fn try_from(reply: DecisionReply) -> Result<Self, Self::Error> {
        let path = match reply.decision_path.trim().to_ascii_uppercase().as_str() {
            "PATH_A" | "A" => DecisionPath::Ignore,
            "PATH_B" | "B" => DecisionPath::Respond {
                missing_domains: reply.missing_domains,
                task_type: reply
                    .task_type
                    .as_deref()
                    .map(task_type_from)
                    .unwrap_or_default(),
            },
            "PATH_C" | "C" => DecisionPath::Clarify,
            other => {
                return Err(AgentError::Unexpected(format!("decision_path '{other}'")));
            }
        };
        Ok(Decision {
            path,
            urgency: reply.urgency.min(10),
            needs_response: reply.needs_response,
            reasoning: reply.reasoning,
            active_domains: reply.active_domains,
        })
    }
}

/// Unknown task types fall back to a plain perspective.
fn task_type_from(raw: &str) -> TaskType {
    match raw.trim() {
        "translate_jargon" => TaskType::TranslateJargon,
        "fill_gap" => TaskType::FillGap,
        "factual_correction" => TaskType::FactualCorrection,
        "clarification" => TaskType::Clarification,
        _ => TaskType::ProvidePerspective,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpReply {
    #[serde(default)]
    pub is_follow_up: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityReply {
    #[serde(default)]
    pub are_similar: bool,
}

/// A detection reply may carry one verdict or several candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DetectionReply<T> {
    Many { findings: Vec<T> },
    One(T),
}

impl<T> DetectionReply<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            DetectionReply::Many { findings } => findings,
            DetectionReply::One(one) => vec![one],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorVerdict {
    #[serde(default)]
    pub error_detected: bool,
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub correct_information: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub domains_needed: Vec<String>,
    #[serde(default)]
    pub issue_description: String,
}

impl ErrorVerdict {
    pub fn into_finding(self) -> Option<AnalysisFinding> {
        if !self.error_detected {
            return None;
        }
        Some(AnalysisFinding {
            kind: FindingKind::FactualError,
            description: self.error_description,
            issue_description: self.issue_description,
            severity: self.severity,
            domains_needed: self.domains_needed,
            priority: Priority::P1,
            correction: self.correct_information,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StuckVerdict {
    #[serde(default)]
    pub stuck_detected: bool,
    #[serde(default)]
    pub stuck_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub domains_needed: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub issue_description: String,
}

impl StuckVerdict {
    /// Stuck findings land in P2 or P3; anything else defaults to P2.
    pub fn into_finding(self) -> Option<AnalysisFinding> {
        if !self.stuck_detected {
            return None;
        }
        let priority = match self.priority.as_deref().map(str::parse::<Priority>) {
            Some(Ok(Priority::P3)) => Priority::P3,
            _ => Priority::P2,
        };
        let description = match self.stuck_type {
            Some(kind) if !self.description.is_empty() => format!("{kind}: {}", self.description),
            _ => self.description,
        };
        Some(AnalysisFinding {
            kind: FindingKind::StuckSignal,
            description,
            issue_description: self.issue_description,
            severity: self.severity,
            domains_needed: self.domains_needed,
            priority,
            correction: None,
        })
    }
}

/// The single most severe finding; earlier candidates win ties.
pub fn most_severe(findings: impl IntoIterator<Item = AnalysisFinding>) -> Option<AnalysisFinding> {
    findings.into_iter().fold(None, |best, f| match best {
        Some(b) if b.severity >= f.severity => Some(b),
        _ => Some(f),
    })
}
