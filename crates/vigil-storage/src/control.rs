use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use vigil_common::types::{AgentRecord, CommandRecord, DesiredState};

const CONTROL_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commands (
    agent_id TEXT PRIMARY KEY,
    desired_state TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_last_seen ON agents(last_seen);
";

/// Command and agent tables (`control.db`).
///
/// One row per agent identity; every write is a single-statement upsert, so
/// each identity's record changes atomically and concurrent writers resolve
/// as last-write-wins in lock order.
pub struct ControlStore {
    conn: Mutex<Connection>,
}

impl ControlStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(CONTROL_SCHEMA)?;
        tracing::info!(path = %path.display(), "Opened control database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_command(&self, agent_id: &str) -> Result<Option<CommandRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT desired_state, updated_at FROM commands WHERE agent_id = ?1",
                rusqlite::params![agent_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(state, updated_ms)| {
            let desired_state = state.parse::<DesiredState>().map_err(|_| {
                StorageError::InvalidValue {
                    column: "desired_state",
                    value: state.clone(),
                }
            })?;
            Ok(CommandRecord {
                agent_id: agent_id.to_string(),
                desired_state,
                updated_at: DateTime::from_timestamp_millis(updated_ms),
            })
        })
        .transpose()
    }

    pub fn set_command(&self, agent_id: &str, desired_state: DesiredState) -> Result<CommandRecord> {
        let conn = self.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO commands (agent_id, desired_state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(agent_id) DO UPDATE SET
                desired_state = excluded.desired_state,
                updated_at = excluded.updated_at",
            rusqlite::params![agent_id, desired_state.as_str(), now.timestamp_millis()],
        )?;
        Ok(CommandRecord {
            agent_id: agent_id.to_string(),
            desired_state,
            updated_at: Some(now),
        })
    }

    pub fn touch_agent(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        let ms = seen_at.timestamp_millis();
        conn.execute(
            "INSERT INTO agents (agent_id, first_seen, last_seen) VALUES (?1, ?2, ?2)
             ON CONFLICT(agent_id) DO UPDATE SET
                last_seen = MAX(agents.last_seen, excluded.last_seen)",
            rusqlite::params![agent_id, ms],
        )?;
        Ok(())
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT agent_id, first_seen, last_seen FROM agents ORDER BY last_seen DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut agents = Vec::new();
        for row in rows {
            let (agent_id, first_ms, last_ms) = row?;
            agents.push(AgentRecord {
                agent_id,
                first_seen: DateTime::from_timestamp_millis(first_ms).unwrap_or_default(),
                last_seen: DateTime::from_timestamp_millis(last_ms).unwrap_or_default(),
            });
        }
        Ok(agents)
    }
}
