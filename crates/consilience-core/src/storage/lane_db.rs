//! Persistent priority lanes using redb.
//!
//! # Table design
//!
//! A single `LANES` table uses a composite key:
//! ```text
//! [ session_len: u16 BE | session utf-8 | priority: u8 | seq: u64 BE ]
//! ```
//!
//! The length prefix keeps sessions from sharing key prefixes, and the
//! big-endian sequence number makes byte order equal enqueue order. One range
//! scan over `session ‖ priority` therefore returns a lane oldest-first. The
//! next sequence number is derived from the lane's last key inside the same
//! write transaction, so concurrent appends serialize on redb's single writer.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::LaneStore;
use crate::error::{ConsilienceError, Result};
use crate::types::{Priority, QueuedResponse, SessionId};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Value: JSON-encoded QueuedResponse
const LANES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("lanes");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

/// Session ids must fit the `u16` length prefix.
fn lane_prefix(session: &SessionId, priority: Priority) -> Result<Vec<u8>> {
    let bytes = session.as_str().as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        ConsilienceError::InvalidConfig(format!(
            "session id is {} bytes; lane keys allow at most {}",
            bytes.len(),
            u16::MAX
        ))
    })?;
    let mut key = Vec::with_capacity(2 + bytes.len() + 1 + 8);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(bytes);
    key.push(priority.index() as u8);
    Ok(key)
}

fn entry_key(prefix: &[u8], seq: u64) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn seq_of(key: &[u8]) -> u64 {
    let mut tail = [0u8; 8];
    if key.len() >= 8 {
        tail.copy_from_slice(&key[key.len() - 8..]);
    }
    u64::from_be_bytes(tail)
}

fn db_err(e: impl std::fmt::Display) -> ConsilienceError {
    ConsilienceError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// LaneDb
// ---------------------------------------------------------------------------

pub struct LaneDb {
    db: Database,
}

impl LaneDb {
    /// Open or create the redb database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(LANES).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Every session with at least one queued entry.
    pub fn sessions(&self) -> Result<Vec<String>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(LANES).map_err(db_err)?;
        let mut out: Vec<String> = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (k, _) = entry.map_err(db_err)?;
            let key = k.value();
            if key.len() < 2 {
                continue;
            }
            let len = usize::from(u16::from_be_bytes([key[0], key[1]]));
            let Some(raw) = key.get(2..2 + len) else {
                continue;
            };
            let name = String::from_utf8_lossy(raw).into_owned();
            if out.last() != Some(&name) {
                out.push(name);
            }
        }
        out.dedup();
        Ok(out)
    }
}

impl LaneStore for LaneDb {
    fn append(&self, session: &SessionId, response: &QueuedResponse) -> Result<()> {
        let prefix = lane_prefix(session, response.priority)?;
        let value = serde_json::to_vec(response)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(LANES).map_err(db_err)?;
            let lower = entry_key(&prefix, 0);
            let upper = entry_key(&prefix, u64::MAX);
            let next_seq = match table
                .range(lower.as_slice()..=upper.as_slice())
                .map_err(db_err)?
                .next_back()
            {
                Some(last) => {
                    let (k, _) = last.map_err(db_err)?;
                    seq_of(k.value()) + 1
                }
                None => 0,
            };
            let key = entry_key(&prefix, next_seq);
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn read_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        let prefix = lane_prefix(session, priority)?;
        let lower = entry_key(&prefix, 0);
        let upper = entry_key(&prefix, u64::MAX);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(LANES).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    fn take_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>> {
        let prefix = lane_prefix(session, priority)?;
        let lower = entry_key(&prefix, 0);
        let upper = entry_key(&prefix, u64::MAX);
        let wt = self.db.begin_write().map_err(db_err)?;
        let mut taken = Vec::new();
        {
            let mut table = wt.open_table(LANES).map_err(db_err)?;
            let mut keys: Vec<Vec<u8>> = Vec::new();
            for entry in table
                .range(lower.as_slice()..=upper.as_slice())
                .map_err(db_err)?
            {
                let (k, v) = entry.map_err(db_err)?;
                keys.push(k.value().to_vec());
                taken.push(serde_json::from_slice(v.value())?);
            }
            for key in keys {
                table.remove(key.as_slice()).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(taken)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseOrigin;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, LaneDb) {
        let dir = TempDir::new().unwrap();
        let db = LaneDb::open(&dir.path().join("lanes.redb")).unwrap();
        (dir, db)
    }

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    fn response(priority: Priority, text: &str) -> QueuedResponse {
        QueuedResponse::new(priority, ResponseOrigin::Trigger, text, vec![], text)
    }

    #[test]
    fn lane_drains_in_enqueue_order() {
        let (_dir, db) = open_tmp();
        let s = sid("s1");
        for text in ["first", "second", "third"] {
            db.append(&s, &response(Priority::P1, text)).unwrap();
        }
        let texts: Vec<_> = db
            .take_lane(&s, Priority::P1)
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(db.read_lane(&s, Priority::P1).unwrap().is_empty());
    }

    #[test]
    fn sequence_continues_after_partial_history() {
        let (_dir, db) = open_tmp();
        let s = sid("s1");
        db.append(&s, &response(Priority::P0, "a")).unwrap();
        db.take_lane(&s, Priority::P0).unwrap();
        db.append(&s, &response(Priority::P0, "b")).unwrap();
        db.append(&s, &response(Priority::P0, "c")).unwrap();
        let texts: Vec<_> = db
            .read_lane(&s, Priority::P0)
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn sessions_and_lanes_do_not_bleed() {
        let (_dir, db) = open_tmp();
        // "ab" + priority must never collide with "a" + something
        db.append(&sid("a"), &response(Priority::P2, "from a")).unwrap();
        db.append(&sid("ab"), &response(Priority::P2, "from ab")).unwrap();
        db.append(&sid("a"), &response(Priority::P3, "a low")).unwrap();

        let a_p2 = db.read_lane(&sid("a"), Priority::P2).unwrap();
        assert_eq!(a_p2.len(), 1);
        assert_eq!(a_p2[0].text, "from a");
        assert_eq!(db.read_lane(&sid("a"), Priority::P3).unwrap().len(), 1);
        assert_eq!(db.sessions().unwrap(), vec!["a".to_string(), "ab".to_string()]);
    }

    #[test]
    fn oversized_session_id_is_rejected() {
        let (_dir, db) = open_tmp();
        let long = sid(&"x".repeat(usize::from(u16::MAX) + 1));
        let err = db.append(&long, &response(Priority::P0, "a")).unwrap_err();
        assert!(matches!(err, ConsilienceError::InvalidConfig(_)));
        assert!(db.read_lane(&long, Priority::P0).is_err());
        assert!(db.sessions().unwrap().is_empty());

        let longest = sid(&"y".repeat(usize::from(u16::MAX)));
        db.append(&longest, &response(Priority::P0, "b")).unwrap();
        assert_eq!(db.read_lane(&longest, Priority::P0).unwrap().len(), 1);
    }

    #[test]
    fn reopen_preserves_lanes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/lanes.redb");
        {
            let db = LaneDb::open(&path).unwrap();
            db.append(&sid("s1"), &response(Priority::P3, "persisted")).unwrap();
        }
        let db = LaneDb::open(&path).unwrap();
        let lane = db.read_lane(&sid("s1"), Priority::P3).unwrap();
        assert_eq!(lane[0].text, "persisted");
    }
}
