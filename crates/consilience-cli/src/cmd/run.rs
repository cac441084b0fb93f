use crate::output::{print_json, print_responses};
use anyhow::Context;
use chrono::{DateTime, Utc};
use consilience_core::config::{OrchestratorConfig, WarnLevel};
use consilience_core::paths;
use consilience_core::storage::{LaneDb, LaneStore, MemoryStore};
use consilience_core::types::{
    ConversationMessage, Priority, QueuedResponse, ResponseOrigin, SessionId, TriggerSignal,
};
use consilience_core::{Collaborators, Orchestrator};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

/// One line of the stdin event stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    /// A transcribed utterance. Numbered automatically when `message_number`
    /// is omitted.
    Message {
        #[serde(default)]
        message_number: Option<u64>,
        speaker: String,
        text: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        domains: Vec<String>,
    },
    /// An explicit request. Without `message_ref` the context wait is
    /// timer-only.
    Trigger {
        text: String,
        #[serde(default)]
        speaker: Option<String>,
        #[serde(default)]
        message_ref: Option<u64>,
        #[serde(default)]
        trigger_type: Option<String>,
        #[serde(default)]
        potential_follow_up: bool,
    },
    /// The delivery side spoke a response into the conversation.
    Delivered {
        text: String,
        #[serde(default)]
        issue_description: String,
        #[serde(default = "default_delivered_priority")]
        priority: Priority,
    },
    Domains {
        #[serde(default)]
        active: Vec<String>,
        #[serde(default)]
        missing: Vec<String>,
    },
    Summary { text: String },
    /// Pause reading, letting the session's timers run.
    Wait { seconds: f64 },
}

fn default_delivered_priority() -> Priority {
    Priority::P0
}

/// Numbering state carried across events.
#[derive(Default)]
struct Cursor {
    last_message: u64,
    last_speaker: Option<String>,
}

impl Cursor {
    fn number(&mut self, explicit: Option<u64>) -> u64 {
        let n = explicit.unwrap_or(self.last_message + 1);
        self.last_message = self.last_message.max(n);
        n
    }
}

async fn apply(
    orch: &Orchestrator,
    session: &str,
    cursor: &mut Cursor,
    event: Event,
) -> anyhow::Result<()> {
    match event {
        Event::Message {
            message_number,
            speaker,
            text,
            timestamp,
            domains,
        } => {
            let message_number = cursor.number(message_number);
            cursor.last_speaker = Some(speaker.clone());
            orch.record_message(
                session,
                ConversationMessage {
                    message_number,
                    speaker,
                    text,
                    timestamp: timestamp.unwrap_or_else(Utc::now),
                    domains,
                },
            )
            .await?;
        }
        Event::Trigger {
            text,
            speaker,
            message_ref,
            trigger_type,
            potential_follow_up,
        } => {
            let speaker = speaker
                .or_else(|| cursor.last_speaker.clone())
                .unwrap_or_else(|| "participant".to_string());
            orch.submit_trigger(
                session,
                TriggerSignal {
                    trigger_type: trigger_type.unwrap_or_else(|| "explicit_request".to_string()),
                    message_ref,
                    triggering_text: text,
                    speaker,
                    timestamp: Utc::now(),
                    potential_follow_up,
                },
            )
            .await?;
        }
        Event::Delivered {
            text,
            issue_description,
            priority,
        } => {
            let response = QueuedResponse::new(
                priority,
                ResponseOrigin::Trigger,
                text,
                Vec::new(),
                issue_description,
            );
            orch.mark_delivered(session, &response).await?;
        }
        Event::Domains { active, missing } => {
            orch.set_domains(session, active, missing).await?;
        }
        Event::Summary { text } => {
            orch.set_summary(session, text).await?;
        }
        Event::Wait { seconds } => {
            let pause = Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("invalid wait of {seconds} seconds"))?;
            tokio::time::sleep(pause).await;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    session: &str,
    db: Option<&Path>,
    memory: bool,
    json: bool,
) -> anyhow::Result<()> {
    let session = SessionId::parse(session).context("--session must not be blank")?;
    let config = OrchestratorConfig::load(root).context("failed to load config")?;
    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    let (decisions, specialist) = consilience_agent::from_config(&config.llm)
        .context("cannot set up the decision service")?;

    let conversation = Arc::new(MemoryStore::new());
    let lanes: Arc<dyn LaneStore> = if memory {
        conversation.clone()
    } else {
        let path = db.map_or_else(|| paths::lanes_db_path(root), Path::to_path_buf);
        Arc::new(
            LaneDb::open(&path).with_context(|| format!("cannot open {}", path.display()))?,
        )
    };

    let collaborators = Collaborators {
        decisions: Arc::new(decisions),
        specialist: Arc::new(specialist),
        conversation,
        lanes,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let orch = Orchestrator::new(config, collaborators);
        drive(&orch, session.as_str()).await?;
        orch.shutdown().await?;

        let snapshot = orch.peek_all(session.as_str())?;
        if json {
            print_json(&snapshot)?;
        } else {
            print_responses(snapshot.iter());
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Feed stdin into the session until EOF or Ctrl-C.
async fn drive(orch: &Orchestrator, session: &str) -> anyhow::Result<()> {
    orch.ensure_session(session)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut cursor = Cursor::default();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(session, "interrupted; finishing submitted triggers");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed event");
                continue;
            }
        };
        apply(orch, session, &mut cursor, event)
            .await
            .with_context(|| format!("event on line {line_no}"))?;
    }
    Ok(())
}
