//! Storage backend for delivered samples and per-agent commands.
//!
//! The default implementation ([`engine::SqliteStorageEngine`]) keeps samples
//! in daily time-partitioned SQLite databases with WAL mode for concurrent
//! reads, and the command and agent tables in a separate control database
//! ([`control::ControlStore`]).

pub mod control;
pub mod engine;
pub mod error;
pub mod partition;


use chrono::{DateTime, Utc};
use vigil_common::types::{AgentRecord, CommandRecord, DesiredState, MetricPoint, Sample};

pub use error::{Result, StorageError};

/// Persistence backend used by the control and ingestion services.
///
/// Every method is blocking. Implementations must be safe to share across
/// threads (`Send + Sync`) because the server calls them from tokio's
/// blocking pool for many agents at once.
pub trait StorageEngine: Send + Sync {
    /// Appends one delivered sample. Duplicates are stored as-is.
    fn insert_metric(&self, sample: &Sample) -> Result<()>;

    /// Returns the most recent `limit` samples of an agent, oldest first.
    fn query_metrics(&self, agent_id: &str, limit: usize) -> Result<Vec<MetricPoint>>;

    /// Returns the stored command for an agent, if one was ever written.
    fn get_command(&self, agent_id: &str) -> Result<Option<CommandRecord>>;

    /// Creates or replaces the command for an agent. `updated_at` is taken at
    /// write time so the stored record reflects completion order.
    fn set_command(&self, agent_id: &str, desired_state: DesiredState) -> Result<CommandRecord>;

    /// Records that an agent delivered data at `seen_at`.
    fn touch_agent(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()>;

    /// Lists every agent that ever delivered data, most recently seen first.
    fn list_agents(&self) -> Result<Vec<AgentRecord>>;

    /// Removes metric partitions older than `retention_days`. Returns the
    /// number of partitions removed.
    fn cleanup(&self, retention_days: u32) -> Result<u32>;

    /// Returns partition (daily database) information.
    fn list_partitions(&self) -> Result<Vec<PartitionInfo>>;
}

/// Information about a storage partition (daily SQLite database).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PartitionInfo {
    pub date: String,
    pub size_bytes: u64,
    pub path: String,
}
