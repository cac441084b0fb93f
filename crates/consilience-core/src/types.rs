use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConsilienceError, Result};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque identifier scoping all per-conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Blank identifiers are rejected at entry; nothing downstream catches this.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ConsilienceError::MissingSession);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// One of the four output lanes. P0 is the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn all() -> &'static [Priority] {
        &[Priority::P0, Priority::P1, Priority::P2, Priority::P3]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ConsilienceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            _ => Err(ConsilienceError::InvalidPriority(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A transcribed utterance as seen by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_number: u64,
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

/// A response the delivery mechanism has already spoken into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredResponse {
    pub text: String,
    #[serde(default)]
    pub issue_description: String,
    pub priority: Priority,
    pub delivered_at: DateTime<Utc>,
}

/// Read-only view of a session's conversation, always pulled fresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recent_messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub consilience_history: Vec<DeliveredResponse>,
    #[serde(default)]
    pub active_domains: Vec<String>,
    #[serde(default)]
    pub missing_domains: Vec<String>,
}

impl ContextSnapshot {
    /// The most recent delivered response, if any.
    pub fn last_delivered(&self) -> Option<&DeliveredResponse> {
        self.consilience_history.last()
    }

    pub fn has_messages(&self) -> bool {
        !self.recent_messages.is_empty()
    }

    /// Number of messages numbered strictly after `message_number`.
    pub fn messages_after(&self, message_number: u64) -> usize {
        self.recent_messages
            .iter()
            .filter(|m| m.message_number > message_number)
            .count()
    }
}

// ---------------------------------------------------------------------------
// TriggerSignal
// ---------------------------------------------------------------------------

/// Upstream-detected explicit request for the system to act.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSignal {
    #[serde(default = "default_trigger_type")]
    pub trigger_type: String,
    /// Message number of the utterance that fired the trigger.
    #[serde(default)]
    pub message_ref: Option<u64>,
    pub triggering_text: String,
    pub speaker: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub potential_follow_up: bool,
}

fn default_trigger_type() -> String {
    "explicit_request".to_string()
}

// ---------------------------------------------------------------------------
// TaskType
// ---------------------------------------------------------------------------

/// What a specialist is asked to do with its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    ProvidePerspective,
    TranslateJargon,
    FillGap,
    FactualCorrection,
    Clarification,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::ProvidePerspective => "provide_perspective",
            TaskType::TranslateJargon => "translate_jargon",
            TaskType::FillGap => "fill_gap",
            TaskType::FactualCorrection => "factual_correction",
            TaskType::Clarification => "clarification",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of trigger classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "path")]
pub enum DecisionPath {
    /// Path A: keep monitoring, say nothing.
    #[serde(rename = "A")]
    Ignore,
    /// Path B: answer with specialist perspectives.
    #[serde(rename = "B")]
    Respond {
        missing_domains: Vec<String>,
        #[serde(default)]
        task_type: TaskType,
    },
    /// Path C: ask the speaker to repeat or clarify.
    #[serde(rename = "C")]
    Clarify,
}

impl DecisionPath {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionPath::Ignore => "A",
            DecisionPath::Respond { .. } => "B",
            DecisionPath::Clarify => "C",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub path: DecisionPath,
    #[serde(default)]
    pub urgency: u8,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub active_domains: Vec<String>,
}

impl Decision {
    pub fn missing_domains(&self) -> &[String] {
        match &self.path {
            DecisionPath::Respond {
                missing_domains, ..
            } => missing_domains,
            _ => &[],
        }
    }
}

/// The prior response handed to classification when a follow-up was verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpContext {
    pub last_response: String,
}

// ---------------------------------------------------------------------------
// AnalysisFinding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    FactualError,
    StuckSignal,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::FactualError => "factual_error",
            FindingKind::StuckSignal => "stuck_signal",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

/// A background-detected candidate issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFinding {
    pub kind: FindingKind,
    pub description: String,
    /// Short restatement used for dedup comparisons.
    #[serde(default)]
    pub issue_description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub domains_needed: Vec<String>,
    pub priority: Priority,
    /// Corrected statement for factual errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

impl AnalysisFinding {
    /// The text compared by the dedup ledger; falls back to the description.
    pub fn dedup_key(&self) -> &str {
        if self.issue_description.trim().is_empty() {
            &self.description
        } else {
            &self.issue_description
        }
    }
}

// ---------------------------------------------------------------------------
// QueuedResponse
// ---------------------------------------------------------------------------

/// Which path produced a queued response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrigin {
    Trigger,
    Clarification,
    FactualError,
    StuckSignal,
}

impl From<FindingKind> for ResponseOrigin {
    fn from(kind: FindingKind) -> Self {
        match kind {
            FindingKind::FactualError => ResponseOrigin::FactualError,
            FindingKind::StuckSignal => ResponseOrigin::StuckSignal,
        }
    }
}

/// An intervention waiting in one of the priority lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub priority: Priority,
    pub text: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub issue_description: String,
    pub enqueued_at: DateTime<Utc>,
    pub origin: ResponseOrigin,
}

impl QueuedResponse {
    pub fn new(
        priority: Priority,
        origin: ResponseOrigin,
        text: impl Into<String>,
        domains: Vec<String>,
        issue_description: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            text: text.into(),
            domains,
            issue_description: issue_description.into(),
            enqueued_at: Utc::now(),
            origin,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_session_id_is_rejected() {
        assert!(matches!(
            SessionId::parse("   "),
            Err(ConsilienceError::MissingSession)
        ));
        assert_eq!(SessionId::parse("team-7").unwrap().as_str(), "team-7");
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("p2".parse::<Priority>().unwrap(), Priority::P2);
        assert_eq!("P0".parse::<Priority>().unwrap(), Priority::P0);
        assert!("P4".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_order_matches_urgency() {
        assert!(Priority::P0 < Priority::P3);
        assert_eq!(Priority::all().len(), 4);
    }

    #[test]
    fn decision_path_tag_serializes_as_letter() {
        let decision = Decision {
            path: DecisionPath::Respond {
                missing_domains: vec!["Biology / Life Sciences".into()],
                task_type: TaskType::FillGap,
            },
            urgency: 6,
            needs_response: true,
            reasoning: "asked how DNA replicates".into(),
            active_domains: vec![],
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["path"], "B");
        assert_eq!(json["task_type"], "fill_gap");
        let back: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(back, decision);
        assert_eq!(back.missing_domains().len(), 1);
    }

    #[test]
    fn ignore_decision_has_no_missing_domains() {
        let decision: Decision = serde_json::from_str(r#"{"path":"A"}"#).unwrap();
        assert_eq!(decision.path, DecisionPath::Ignore);
        assert!(decision.missing_domains().is_empty());
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn dedup_key_falls_back_to_description() {
        let mut finding = AnalysisFinding {
            kind: FindingKind::StuckSignal,
            description: "team keeps asking what a codon is".into(),
            issue_description: String::new(),
            severity: Severity::Medium,
            domains_needed: vec![],
            priority: Priority::P2,
            correction: None,
        };
        assert_eq!(finding.dedup_key(), "team keeps asking what a codon is");
        finding.issue_description = "codon confusion".into();
        assert_eq!(finding.dedup_key(), "codon confusion");
    }

    #[test]
    fn messages_after_counts_strictly_newer() {
        let msg = |n| ConversationMessage {
            message_number: n,
            speaker: "A".into(),
            text: "x".into(),
            timestamp: Utc::now(),
            domains: vec![],
        };
        let snapshot = ContextSnapshot {
            recent_messages: vec![msg(3), msg(4), msg(5), msg(6)],
            ..Default::default()
        };
        assert_eq!(snapshot.messages_after(4), 2);
        assert_eq!(snapshot.messages_after(10), 0);
    }
}
