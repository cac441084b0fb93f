//! Specialist Dispatcher: fan-out to domain specialists and fan-in of their
//! perspectives into one response text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SpecialistConfig;
use crate::error::Result;
use crate::fanout::{CallOutcome, Fanout};
use crate::types::{ContextSnapshot, TaskType};

/// What a specialist is asked for.
#[derive(Debug, Clone)]
pub struct PerspectiveRequest {
    pub domain: String,
    pub context: Arc<ContextSnapshot>,
    pub active_domains: Vec<String>,
    pub task_type: TaskType,
}

/// A domain-scoped text generator.
#[async_trait]
pub trait Specialist: Send + Sync {
    async fn generate_perspective(&self, request: &PerspectiveRequest) -> Result<String>;
}

/// One surviving specialist answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Perspective {
    pub domain: String,
    pub text: String,
}

#[derive(Clone)]
pub struct SpecialistDispatcher {
    specialist: Arc<dyn Specialist>,
    max_domains: usize,
    per_domain_timeout: Duration,
}

impl SpecialistDispatcher {
    pub fn new(specialist: Arc<dyn Specialist>, config: &SpecialistConfig) -> Self {
        Self {
            specialist,
            max_domains: config.max_domains.max(1),
            per_domain_timeout: config.timeout(),
        }
    }

    /// The domains that will actually be consulted: the first
    /// `max_domains`, in the order given, without repeats.
    pub fn select_domains(&self, domains: &[String]) -> Vec<String> {
        let mut picked: Vec<String> = Vec::with_capacity(self.max_domains);
        for domain in domains {
            if picked.len() == self.max_domains {
                break;
            }
            if !domain.trim().is_empty() && !picked.contains(domain) {
                picked.push(domain.clone());
            }
        }
        picked
    }

    /// Consult specialists concurrently. Domains that fail or time out are
    /// omitted; the rest come back in selection order.
    pub async fn gather(
        &self,
        domains: &[String],
        context: Arc<ContextSnapshot>,
        active_domains: &[String],
        task_type: TaskType,
    ) -> Vec<Perspective> {
        let selected = self.select_domains(domains);
        if selected.is_empty() {
            return Vec::new();
        }
        tracing::debug!(domains = ?selected, %task_type, "dispatching specialists");

        let fanout = Fanout::new(selected.len(), self.per_domain_timeout);
        let outcomes = fanout
            .join_all(selected.clone(), |domain| {
                let request = PerspectiveRequest {
                    domain,
                    context: context.clone(),
                    active_domains: active_domains.to_vec(),
                    task_type,
                };
                let specialist = self.specialist.clone();
                async move { specialist.generate_perspective(&request).await }
            })
            .await;

        selected
            .into_iter()
            .zip(outcomes)
            .filter_map(|(domain, outcome)| match outcome {
                CallOutcome::Done(text) if !text.trim().is_empty() => Some(Perspective {
                    domain,
                    text: text.trim().to_string(),
                }),
                CallOutcome::Done(_) => {
                    tracing::warn!(%domain, "specialist returned empty text; omitted");
                    None
                }
                CallOutcome::Failed(e) => {
                    tracing::warn!(%domain, error = %e, "specialist failed; omitted");
                    None
                }
                CallOutcome::TimedOut => {
                    tracing::warn!(%domain, "specialist timed out; omitted");
                    None
                }
            })
            .collect()
    }

    /// Dispatch and combine. Returns `None` when no perspective survived.
    pub async fn dispatch(
        &self,
        domains: &[String],
        context: Arc<ContextSnapshot>,
        active_domains: &[String],
        task_type: TaskType,
    ) -> Option<String> {
        let perspectives = self.gather(domains, context, active_domains, task_type).await;
        combine(&perspectives)
    }
}

/// Join perspectives into one text, prefixing each with its domain when more
/// than one survived.
pub fn combine(perspectives: &[Perspective]) -> Option<String> {
    match perspectives {
        [] => None,
        [only] => Some(only.text.clone()),
        many => Some(
            many.iter()
                .map(|p| format!("From a {} perspective:\n{}", p.domain, p.text))
                .collect::<Vec<_>>()
                .join("\n\n"),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Script, ScriptedSpecialist};

    fn dispatcher(specialist: ScriptedSpecialist) -> SpecialistDispatcher {
        SpecialistDispatcher::new(Arc::new(specialist), &SpecialistConfig::default())
    }

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn never_dispatches_more_than_two_domains() {
        let specialist = ScriptedSpecialist::default();
        let seen = specialist.requested.clone();
        let text = dispatcher(specialist)
            .dispatch(
                &domains(&["Biology", "Chemistry", "Physics", "Philosophy"]),
                Arc::new(ContextSnapshot::default()),
                &[],
                TaskType::ProvidePerspective,
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"Biology".to_string()));
        assert!(seen.contains(&"Chemistry".to_string()));
        assert!(text.starts_with("From a Biology perspective:"));
        assert!(text.contains("From a Chemistry perspective:"));
    }

    #[test]
    fn selection_takes_first_n_without_duplicates() {
        let d = dispatcher(ScriptedSpecialist::default());
        assert_eq!(
            d.select_domains(&domains(&["Math", "Math", "", "Physics", "Biology"])),
            domains(&["Math", "Physics"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_domain_is_omitted() {
        let specialist = ScriptedSpecialist::default();
        specialist.script("Chemistry", Script::Hang);
        let text = dispatcher(specialist)
            .dispatch(
                &domains(&["Biology", "Chemistry"]),
                Arc::new(ContextSnapshot::default()),
                &[],
                TaskType::ProvidePerspective,
            )
            .await
            .unwrap();
        // single survivor: no domain prefix
        assert_eq!(text, "Biology view");
    }

    #[tokio::test]
    async fn all_failures_yield_none() {
        let specialist = ScriptedSpecialist::default();
        specialist.script("Biology", Script::Unavailable);
        specialist.script("Chemistry", Script::Reply("   ".into()));
        let text = dispatcher(specialist)
            .dispatch(
                &domains(&["Biology", "Chemistry"]),
                Arc::new(ContextSnapshot::default()),
                &[],
                TaskType::FactualCorrection,
            )
            .await;
        assert!(text.is_none());
    }

    #[test]
    fn combine_single_has_no_prefix() {
        let text = combine(&[Perspective {
            domain: "Physics".into(),
            text: "Entropy never decreases in an isolated system.".into(),
        }])
        .unwrap();
        assert_eq!(text, "Entropy never decreases in an isolated system.");
        assert!(combine(&[]).is_none());
    }
}
