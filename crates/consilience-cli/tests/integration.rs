#![allow(deprecated)]
use assert_cmd::Command;
use consilience_core::storage::{LaneDb, LaneStore};
use consilience_core::types::{Priority, QueuedResponse, ResponseOrigin, SessionId};
use predicates::prelude::*;
use tempfile::TempDir;

fn consilience(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("consilience").unwrap();
    cmd.current_dir(dir.path())
        .env("CONSILIENCE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

/// Seed the default lane database with one response per given lane.
fn seed_lanes(dir: &TempDir, session: &str, entries: &[(Priority, &str)]) {
    let db = LaneDb::open(&dir.path().join(".consilience/lanes.redb")).unwrap();
    let id = SessionId::parse(session).unwrap();
    for (priority, text) in entries {
        let response = QueuedResponse::new(
            *priority,
            ResponseOrigin::Trigger,
            *text,
            vec!["Biology / Life Sciences".into()],
            format!("issue: {text}"),
        );
        db.append(&id, &response).unwrap();
    }
}

// ---------------------------------------------------------------------------
// consilience config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(dir.path().join(".consilience/config.yaml").exists());

    consilience(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn config_show_fills_defaults_for_partial_file() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".consilience")).unwrap();
    std::fs::write(
        dir.path().join(".consilience/config.yaml"),
        "monitor:\n  interval_seconds: 30\n",
    )
    .unwrap();

    let output = consilience(&dir)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["monitor"]["interval_seconds"], 30);
    assert_eq!(json["monitor"]["startup_delay_seconds"], 120);
    assert_eq!(json["trigger"]["wait_seconds"], 5);
}

#[test]
fn config_validate_passes_on_defaults() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_zero_interval() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".consilience")).unwrap();
    std::fs::write(
        dir.path().join(".consilience/config.yaml"),
        "monitor:\n  interval_seconds: 0\n",
    )
    .unwrap();

    consilience(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] monitor.interval_seconds"))
        .stderr(predicate::str::contains("config validation found errors"));
}

// ---------------------------------------------------------------------------
// consilience lanes / drain
// ---------------------------------------------------------------------------

#[test]
fn lanes_without_database_are_empty() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["lanes", "--session", "talk-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No queued responses."));
    assert!(!dir.path().join(".consilience/lanes.redb").exists());
}

#[test]
fn lanes_json_groups_by_priority_in_fifo_order() {
    let dir = TempDir::new().unwrap();
    seed_lanes(
        &dir,
        "talk-1",
        &[
            (Priority::P0, "first answer"),
            (Priority::P2, "stuck help"),
            (Priority::P0, "second answer"),
        ],
    );

    let output = consilience(&dir)
        .args(["lanes", "--session", "talk-1", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["P0"][0]["text"], "first answer");
    assert_eq!(json["P0"][1]["text"], "second answer");
    assert_eq!(json["P2"][0]["text"], "stuck help");
    assert_eq!(json["P1"].as_array().unwrap().len(), 0);
}

#[test]
fn lanes_lists_sessions_with_counts() {
    let dir = TempDir::new().unwrap();
    seed_lanes(&dir, "talk-1", &[(Priority::P1, "correction")]);
    seed_lanes(&dir, "talk-2", &[(Priority::P3, "aside"), (Priority::P3, "aside 2")]);

    consilience(&dir)
        .arg("lanes")
        .assert()
        .success()
        .stdout(predicate::str::contains("talk-1"))
        .stdout(predicate::str::contains("talk-2"));
}

#[test]
fn drain_removes_only_the_requested_lane() {
    let dir = TempDir::new().unwrap();
    seed_lanes(
        &dir,
        "talk-1",
        &[(Priority::P0, "answer"), (Priority::P1, "correction")],
    );

    consilience(&dir)
        .args(["drain", "--session", "talk-1", "--priority", "P0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("answer"));

    let output = consilience(&dir)
        .args(["lanes", "--session", "talk-1", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["P0"].as_array().unwrap().len(), 0);
    assert_eq!(json["P1"][0]["text"], "correction");
}

#[test]
fn drain_rejects_unknown_priority() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["drain", "--session", "talk-1", "--priority", "P7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("P7"));
}

// ---------------------------------------------------------------------------
// consilience run
// ---------------------------------------------------------------------------

#[test]
fn run_requires_api_key() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["run", "--session", "talk-1", "--memory"])
        .env_remove("OPENAI_API_KEY")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn run_rejects_blank_session() {
    let dir = TempDir::new().unwrap();
    consilience(&dir)
        .args(["run", "--session", "   "])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--session must not be blank"));
}

#[test]
fn run_with_empty_stream_prints_empty_lanes() {
    let dir = TempDir::new().unwrap();
    let output = consilience(&dir)
        .args(["run", "--session", "talk-1", "--memory", "--json"])
        .env("OPENAI_API_KEY", "test-key")
        .write_stdin("# nothing said yet\n\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["P0"].as_array().unwrap().len(), 0);
}
