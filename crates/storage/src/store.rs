//! SQLite event store implementation.

use crate::{Event, Result, RunId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// How a recorded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Answered,
    Failed,
    /// No terminal event was recorded (still running, or the process died).
    Unfinished,
}

/// Summary of a recorded run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: RunId,
    pub agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_calls: u64,
    pub outcome: RunOutcome,
}

/// SQLite-backed event store.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                run_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_run
                ON events(run_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, run_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.run_id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load the events of a run in insertion order, optionally filtered by kind name.
    pub fn load_run(&self, run_id: RunId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, timestamp, data FROM events
             WHERE run_id = ?1 AND (?2 IS NULL OR kind = ?2) ORDER BY seq",
        )?;

        let events = stmt
            .query_map(params![run_id.to_string(), kind], |row| {
                let id: String = row.get(0)?;
                let run_id: String = row.get(1)?;
                let timestamp: String = row.get(2)?;
                let data: String = row.get(3)?;
                Ok((id, run_id, timestamp, data))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, run_id, timestamp, data)| {
                Some(Event {
                    id: id.parse().ok()?,
                    run_id: RunId(run_id.parse().ok()?),
                    timestamp: timestamp.parse().ok()?,
                    kind: serde_json::from_str(&data).ok()?,
                })
            })
            .collect();

        Ok(events)
    }

    /// List recorded runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT run_id,
                   MIN(timestamp),
                   MAX(CASE WHEN kind = 'run_end' THEN timestamp END),
                   MAX(CASE WHEN kind = 'run_start' THEN json_extract(data, '$.agent') END),
                   SUM(CASE WHEN kind = 'tool_call_started' THEN 1 ELSE 0 END),
                   MAX(CASE WHEN kind = 'final_answer' THEN 1 WHEN kind = 'error' THEN 0 END)
            FROM events
            GROUP BY run_id
            ORDER BY MIN(seq) DESC
            "#,
        )?;

        let runs = stmt
            .query_map([], |row| {
                let run_id: String = row.get(0)?;
                let started_at: String = row.get(1)?;
                let ended_at: Option<String> = row.get(2)?;
                let agent: Option<String> = row.get(3)?;
                let tool_calls: i64 = row.get(4)?;
                let answered: Option<i64> = row.get(5)?;
                Ok((run_id, started_at, ended_at, agent, tool_calls, answered))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(run_id, started_at, ended_at, agent, tool_calls, answered)| {
                let outcome = match answered {
                    Some(1) => RunOutcome::Answered,
                    Some(_) => RunOutcome::Failed,
                    None => RunOutcome::Unfinished,
                };
                Some(RunSummary {
                    id: RunId(run_id.parse().ok()?),
                    agent,
                    started_at: started_at.parse().ok()?,
                    ended_at: ended_at.and_then(|t| t.parse().ok()),
                    tool_calls: u64::try_from(tool_calls).unwrap_or_default(),
                    outcome,
                })
            })
            .collect();

        Ok(runs)
    }
}
