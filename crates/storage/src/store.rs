//! SQLite event store implementation.

use crate::{Error, Event, EventKind, Result, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// Summary of a recorded session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub prompt_count: usize,
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
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, timestamp);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load events for a session in the order they were appended.
    ///
    /// `kind` restricts the result to one event kind (e.g. `"tool_call"`).
    pub fn load_session(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map(params![session_id.to_string(), kind], |row| {
                let id: String = row.get(0)?;
                let session_id: String = row.get(1)?;
                let timestamp: String = row.get(2)?;
                let data: String = row.get(3)?;
                Ok((id, session_id, timestamp, data))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let events = rows
            .into_iter()
            .filter_map(|(id, session_id, timestamp, data)| {
                Some(Event {
                    id: id.parse().ok()?,
                    session_id: session_id.parse().ok()?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .ok()?
                        .with_timezone(&Utc),
                    kind: serde_json::from_str(&data).ok()?,
                })
            })
            .collect();

        Ok(events)
    }

    /// List sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.session_id, s.timestamp, s.data,
                    (SELECT MAX(e.timestamp) FROM events e
                      WHERE e.session_id = s.session_id AND e.kind = 'session_end'),
                    (SELECT COUNT(*) FROM events p
                      WHERE p.session_id = s.session_id AND p.kind = 'prompt')
             FROM events s
             WHERE s.kind = 'session_start'
             ORDER BY s.rowid DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let session_id: String = row.get(0)?;
                let started: String = row.get(1)?;
                let data: String = row.get(2)?;
                let ended: Option<String> = row.get(3)?;
                let prompts: i64 = row.get(4)?;
                Ok((session_id, started, data, ended, prompts))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (session_id, started, data, ended, prompts) in rows {
            let Ok(id) = session_id.parse::<SessionId>() else {
                continue;
            };
            let Some(started_at) = parse_timestamp(&started) else {
                continue;
            };
            let (provider, model) = match serde_json::from_str::<EventKind>(&data)? {
                EventKind::SessionStart { provider, model } => (provider, model),
                _ => continue,
            };
            sessions.push(SessionSummary {
                id,
                provider,
                model,
                started_at,
                ended_at: ended.as_deref().and_then(parse_timestamp),
                prompt_count: usize::try_from(prompts).unwrap_or_default(),
            });
        }

        Ok(sessions)
    }

    /// Resolve a session from a unique id prefix.
    pub fn find_session(&self, prefix: &str) -> Result<SessionId> {
        let matching: Vec<SessionId> = self
            .list_sessions()?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| id.to_string().starts_with(prefix))
            .collect();

        match matching.as_slice() {
            [] => Err(Error::NotFound(format!("session '{prefix}'"))),
            [id] => Ok(*id),
            _ => Err(Error::Ambiguous {
                prefix: prefix.to_string(),
                matches: matching.iter().map(|id| id.to_string()).collect(),
            }),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
