//! Prompt rendering. The core treats prompt content as opaque; these only
//! need to ask for the reply shapes in [`crate::types`].

use consilience_core::types::{ContextSnapshot, FollowUpContext, TaskType, TriggerSignal};

use consilience_core::specialist::PerspectiveRequest;

/// Delivered responses are quoted up to this many characters.
const HISTORY_EXCERPT: usize = 100;
/// Specialists see only the tail of the raw messages.
const SPECIALIST_MESSAGES: usize = 5;

pub const DOMAINS: &[&str] = &[
    "Biology / Life Sciences",
    "Chemistry / Biochemistry",
    "Physics / Astronomy",
    "Mathematics / Statistics",
    "Computer Science / Software Engineering",
    "Medicine / Health Sciences / Neuroscience",
    "Psychology / Cognitive Science",
    "Engineering (Mechanical, Electrical, Civil, etc.)",
    "Business / Economics / Management",
    "Social Sciences / Sociology / Anthropology",
    "Environmental Science / Ecology",
    "Political Science / Law",
    "Philosophy / Ethics",
    "History / Humanities",
    "Linguistics / Communication",
    "Data Science / Machine Learning",
    "Design / User Experience",
    "Robotics / Automation",
];

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(HISTORY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn domain_list() -> String {
    DOMAINS
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn history(context: &ContextSnapshot) -> String {
    if context.consilience_history.is_empty() {
        return "None yet".to_string();
    }
    context
        .consilience_history
        .iter()
        .map(|r| format!("[{}] {}", r.delivered_at.to_rfc3339(), excerpt(&r.text)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn transcript(context: &ContextSnapshot) -> String {
    context
        .recent_messages
        .iter()
        .map(|m| format!("{}: {}", m.speaker, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary, raw messages with their domains, and prior contributions.
pub fn render_context(context: &ContextSnapshot) -> String {
    let mut out = Vec::new();
    if !context.summary.trim().is_empty() {
        out.push("## Earlier discussion (summary)".to_string());
        out.push(context.summary.clone());
        out.push(String::new());
    }
    if !context.recent_messages.is_empty() {
        out.push("## Recent messages".to_string());
        for m in &context.recent_messages {
            if m.domains.is_empty() {
                out.push(format!("{}: {}", m.speaker, m.text));
            } else {
                out.push(format!("{}: {} [domains: {}]", m.speaker, m.text, m.domains.join(", ")));
            }
        }
        out.push(String::new());
    }
    if !context.consilience_history.is_empty() {
        out.push("## Your earlier contributions".to_string());
        out.push(history(context));
    }
    out.join("\n")
}

pub fn classify(
    trigger: &TriggerSignal,
    context: &ContextSnapshot,
    followup: Option<&FollowUpContext>,
) -> String {
    let active = if context.active_domains.is_empty() {
        "none identified yet".to_string()
    } else {
        context.active_domains.join(", ")
    };
    let followup_note = match followup {
        Some(f) => format!(
            "\nThis is a verified follow-up to your previous answer:\n{}\n",
            f.last_response
        ),
        None => String::new(),
    };
    format!(
        r#"You are the liaison for an expert assistant listening to a live conversation.
Someone addressed the assistant. Decide whether it should speak.

Trigger ({trigger_type}) from {speaker}:
"{text}"
{followup_note}
Conversation:
{context}

Domains currently discussed: {active}

Choose one path:
- PATH_A: no question or request was actually made; keep listening.
- PATH_B: a question or request needs an expert answer. List the expert
  perspectives that would answer it in missing_domains (never empty).
- PATH_C: the transcription is too garbled to tell what was asked.

Reply with a JSON object:
{{"decision_path": "PATH_A|PATH_B|PATH_C", "reasoning": "...",
  "active_domains": [...], "missing_domains": [...], "urgency": 0-10,
  "needs_response": true|false,
  "task_type": "provide_perspective|translate_jargon|fill_gap|factual_correction"}}"#,
        trigger_type = trigger.trigger_type,
        speaker = trigger.speaker,
        text = trigger.triggering_text,
        context = render_context(context),
    )
}

pub fn verify_followup(message_text: &str, speaker: &str, last_response: &str) -> String {
    format!(
        r#"Your last contribution to the conversation was:
{last_response}

{speaker} now said:
{message_text}

Is this message about, referring to or continuing your last contribution?
Reply with a JSON object: {{"is_follow_up": true|false, "reasoning": "..."}}"#
    )
}

pub fn detect_factual_error(context: &ContextSnapshot) -> String {
    format!(
        r#"Review this live transcript for serious, unambiguous factual errors.

{transcript}

Be conservative. Ignore unfinished sentences, simplifications, quiz or
hypothetical questions, and anything you are unsure about.

Use domain names from this list exactly:
{domains}

Reply with a JSON object:
{{"error_detected": true|false, "error_description": "...",
  "correct_information": "...", "severity": "low|medium|high",
  "domains_needed": [...], "issue_description": "one line, for deduplication"}}"#,
        transcript = transcript(context),
        domains = domain_list(),
    )
}

pub fn detect_stuck_signal(context: &ContextSnapshot) -> String {
    format!(
        r#"Review this live transcript for clear signs the group is stuck and needs help:
repeated or unanswered questions, explicit confusion, frustration, direct
requests for help or for the meaning of a term.

{transcript}

Already addressed by you:
{history}

Be conservative: natural flow, teaching, rhetorical questions and mild
uncertainty are not stuck.

Use domain names from this list exactly:
{domains}

Reply with a JSON object:
{{"stuck_detected": true|false, "stuck_type": "...", "description": "...",
  "severity": "low|medium|high", "domains_needed": [...],
  "priority": "P2|P3", "issue_description": "one line, for deduplication"}}"#,
        transcript = transcript(context),
        history = history(context),
        domains = domain_list(),
    )
}

pub fn compare_issues(first: &str, second: &str) -> String {
    format!(
        r#"Do these two describe the same issue, such that addressing one would address the other?

1: {first}
2: {second}

Reply with a JSON object: {{"are_similar": true|false, "reasoning": "..."}}"#
    )
}

fn task_instructions(task: TaskType, domain: &str) -> String {
    match task {
        TaskType::ProvidePerspective | TaskType::Clarification => format!(
            "The conversation lacks a {domain} perspective. Add what it is missing."
        ),
        TaskType::TranslateJargon => format!(
            "The conversation used terms from another field. Explain them in {domain} terms with an analogy."
        ),
        TaskType::FillGap => format!(
            "The conversation has a gap in {domain} knowledge. Fill it and tie it back to their work."
        ),
        TaskType::FactualCorrection => format!(
            "Something said about {domain} is wrong. State the correct information plainly."
        ),
    }
}

pub fn perspective(request: &PerspectiveRequest) -> String {
    let context = &request.context;
    let mut recent = Vec::new();
    if !context.summary.trim().is_empty() {
        recent.push(format!("Summary: {}", context.summary));
    }
    let skip = context
        .recent_messages
        .len()
        .saturating_sub(SPECIALIST_MESSAGES);
    for m in context.recent_messages.iter().skip(skip) {
        recent.push(format!("{}: {}", m.speaker, m.text));
    }
    let active = if request.active_domains.is_empty() {
        "general discussion".to_string()
    } else {
        request.active_domains.join(", ")
    };
    format!(
        r#"You are a {domain} researcher explaining to undergraduates.

Conversation:
{recent}

Being discussed: {active}

Already said by you:
{history}

Task ({task}): {instructions}

Two to four sentences, plain language, no repetition of earlier contributions.
Reply with the perspective only."#,
        domain = request.domain,
        recent = recent.join("\n"),
        history = history(context),
        task = request.task_type,
        instructions = task_instructions(request.task_type, &request.domain),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        let long = "é".repeat(150);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), HISTORY_EXCERPT + 3);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn empty_context_renders_nothing() {
        assert!(render_context(&ContextSnapshot::default()).is_empty());
    }
}
