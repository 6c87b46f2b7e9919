use crate::control::ControlStore;
use crate::error::Result;
use crate::partition::PartitionManager;
use crate::{PartitionInfo, StorageEngine};
use chrono::{DateTime, Utc};
use std::path::Path;
use vigil_common::types::{AgentRecord, CommandRecord, DesiredState, MetricPoint, Sample};

const CONTROL_DB_FILE: &str = "control.db";

pub struct SqliteStorageEngine {
    partitions: PartitionManager,
    control: ControlStore,
}

impl SqliteStorageEngine {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            partitions: PartitionManager::new(data_dir)?,
            control: ControlStore::open(&data_dir.join(CONTROL_DB_FILE))?,
        })
    }
}

impl StorageEngine for SqliteStorageEngine {
    fn insert_metric(&self, sample: &Sample) -> Result<()> {
        let key = self.partitions.get_or_create(sample.timestamp)?;
        self.partitions.with_partition(&key, |conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO samples (agent_id, timestamp, cpu, ram, received_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            stmt.execute(rusqlite::params![
                &sample.agent_id,
                sample.timestamp.timestamp_millis(),
                sample.cpu_pct,
                sample.ram_pct,
                Utc::now().timestamp_millis(),
            ])?;
            Ok(())
        })
    }

    fn query_metrics(&self, agent_id: &str, limit: usize) -> Result<Vec<MetricPoint>> {
        let mut newest_first: Vec<MetricPoint> = Vec::new();
        if limit == 0 {
            return Ok(newest_first);
        }

        // Walk partitions newest-first until enough rows are collected.
        for key in self.partitions.keys_newest_first()? {
            let remaining = limit - newest_first.len();
            self.partitions.with_partition(&key, |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT timestamp, cpu, ram FROM samples
                     WHERE agent_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![agent_id, remaining as i64],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, f64>(2)?,
                        ))
                    },
                )?;
                for row in rows {
                    let (ts_ms, cpu, ram) = row?;
                    newest_first.push(MetricPoint {
                        timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
                        cpu,
                        ram,
                    });
                }
                Ok(())
            })?;
            if newest_first.len() >= limit {
                break;
            }
        }

        newest_first.reverse();
        Ok(newest_first)
    }

    fn get_command(&self, agent_id: &str) -> Result<Option<CommandRecord>> {
        self.control.get_command(agent_id)
    }

    fn set_command(&self, agent_id: &str, desired_state: DesiredState) -> Result<CommandRecord> {
        self.control.set_command(agent_id, desired_state)
    }

    fn touch_agent(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        self.control.touch_agent(agent_id, seen_at)
    }

    fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.control.list_agents()
    }

    fn cleanup(&self, retention_days: u32) -> Result<u32> {
        self.partitions.cleanup_older_than(retention_days)
    }

    fn list_partitions(&self) -> Result<Vec<PartitionInfo>> {
        self.partitions.list_partition_info()
    }
}
