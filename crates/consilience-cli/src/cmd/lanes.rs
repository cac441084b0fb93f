use crate::output::{print_json, print_responses, print_table};
use anyhow::Context;
use consilience_core::config::OrchestratorConfig;
use consilience_core::paths;
use consilience_core::queue::PriorityQueueStore;
use consilience_core::storage::LaneDb;
use consilience_core::types::{Priority, SessionId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Lanes {
    db: Arc<LaneDb>,
    queue: PriorityQueueStore,
}

/// Open the lane database, or `None` when it has never been created.
fn open(root: &Path, db: Option<&Path>) -> anyhow::Result<Option<Lanes>> {
    let path: PathBuf = db.map_or_else(|| paths::lanes_db_path(root), Path::to_path_buf);
    if !path.exists() {
        return Ok(None);
    }
    let config = OrchestratorConfig::load(root).context("failed to load config")?;
    let db = Arc::new(
        LaneDb::open(&path).with_context(|| format!("cannot open {}", path.display()))?,
    );
    let queue = PriorityQueueStore::new(db.clone(), &config.queue);
    Ok(Some(Lanes { db, queue }))
}

pub fn show(
    root: &Path,
    session: Option<&str>,
    db: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let lanes = open(root, db)?;
    match session {
        Some(session) => show_session(lanes.as_ref(), session, json),
        None => list_sessions(lanes.as_ref(), json),
    }
}

fn show_session(lanes: Option<&Lanes>, session: &str, json: bool) -> anyhow::Result<()> {
    let id = SessionId::parse(session)?;
    let snapshot = match lanes {
        Some(l) => l.queue.peek_all(&id)?,
        None => Default::default(),
    };
    if json {
        print_json(&snapshot)?;
    } else {
        print_responses(snapshot.iter());
    }
    Ok(())
}

fn list_sessions(lanes: Option<&Lanes>, json: bool) -> anyhow::Result<()> {
    let mut summary = Vec::new();
    if let Some(l) = lanes {
        for raw in l.db.sessions()? {
            let id = SessionId::parse(raw)?;
            let snapshot = l.queue.peek_all(&id)?;
            let counts: Vec<usize> = Priority::all()
                .iter()
                .map(|p| snapshot.lane(*p).len())
                .collect();
            summary.push((id, counts));
        }
    }

    if json {
        let value: Vec<serde_json::Value> = summary
            .iter()
            .map(|(id, counts)| {
                serde_json::json!({
                    "session": id.as_str(),
                    "P0": counts[0],
                    "P1": counts[1],
                    "P2": counts[2],
                    "P3": counts[3],
                })
            })
            .collect();
        return print_json(&value);
    }
    if summary.is_empty() {
        println!("No sessions with queued responses.");
        return Ok(());
    }
    let rows = summary
        .into_iter()
        .map(|(id, counts)| {
            let mut row = vec![id.to_string()];
            row.extend(counts.iter().map(usize::to_string));
            row
        })
        .collect();
    print_table(&["SESSION", "P0", "P1", "P2", "P3"], rows);
    Ok(())
}

pub fn drain(
    root: &Path,
    session: &str,
    priority: Priority,
    db: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let id = SessionId::parse(session)?;
    let drained = match open(root, db)? {
        Some(l) => l
            .queue
            .drain(&id, priority)
            .with_context(|| format!("failed to drain {priority} for {id}"))?,
        None => Vec::new(),
    };
    tracing::info!(session = %id, %priority, count = drained.len(), "lane drained");
    if json {
        print_json(&drained)?;
    } else {
        print_responses(drained.iter());
    }
    Ok(())
}
