use crate::auth::{check_credential, AuthError};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use vigil_common::types::Sample;
use vigil_common::validation::{validate_sample, ValidationError};
use vigil_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Reported to the agent as retryable.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Stores one delivered sample.
///
/// The credential and the payload are checked before anything is written.
/// Re-delivered samples are stored again; the metric table has no uniqueness
/// constraint on timestamps.
pub async fn ingest(
    state: &AppState,
    sample: Sample,
    credential: Option<&str>,
) -> Result<(), IngestError> {
    check_credential(state.config.api_key.as_deref(), credential)?;
    validate_sample(&sample)?;

    let retention_days = state.config.retention_days;
    if outside_retention(sample.timestamp, Utc::now(), retention_days) {
        tracing::warn!(
            agent_id = %sample.agent_id,
            timestamp = %sample.timestamp,
            retention_days,
            "Sample is older than the retention window; the next cleanup will delete it"
        );
    }

    let agent_id = sample.agent_id.clone();
    state
        .with_storage(move |s| {
            s.insert_metric(&sample)?;
            if let Err(e) = s.touch_agent(&sample.agent_id, Utc::now()) {
                // The sample itself is durable at this point
                tracing::warn!(agent_id = %sample.agent_id, error = %e, "Failed to update agent last_seen");
            }
            Ok(())
        })
        .await?;
    tracing::debug!(agent_id = %agent_id, "Sample stored");
    Ok(())
}

/// True when the sample lands in a partition the retention cleanup already
/// considers expired.
fn outside_retention(timestamp: DateTime<Utc>, now: DateTime<Utc>, retention_days: u32) -> bool {
    match now.checked_sub_signed(chrono::Duration::days(i64::from(retention_days))) {
        Some(cutoff) => timestamp.date_naive() < cutoff.date_naive(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vigil_storage::engine::SqliteStorageEngine;

    fn state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(SqliteStorageEngine::new(dir.path()).unwrap());
        let config = ServerConfig {
            api_key: Some("k".to_string()),
            ..ServerConfig::default()
        };
        (dir, AppState::new(storage, config))
    }

    #[tokio::test]
    async fn valid_sample_is_stored_and_agent_seen() {
        let (_dir, state) = state();
        ingest(&state, Sample::new("pc-001", Utc::now(), 12.5, 40.0), Some("k"))
            .await
            .unwrap();

        let points = state.storage.query_metrics("pc-001", 10).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].cpu, 12.5);
        assert_eq!(state.storage.list_agents().unwrap()[0].agent_id, "pc-001");
    }

    #[tokio::test]
    async fn invalid_sample_writes_nothing() {
        let (_dir, state) = state();
        let err = ingest(&state, Sample::new("pc-001", Utc::now(), 120.0, 40.0), Some("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(ValidationError::OutOfRange { field: "cpu", .. })));

        let err = ingest(&state, Sample::new("pc-001", Utc::now(), 1.0, 40.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Auth(AuthError::Missing)));

        assert!(state.storage.query_metrics("pc-001", 10).unwrap().is_empty());
        assert!(state.storage.list_agents().unwrap().is_empty());
    }

    #[test]
    fn retention_window_matches_partition_cleanup() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let edge = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
        assert!(!outside_retention(edge, now, 30));
        assert!(outside_retention(edge - chrono::Duration::seconds(1), now, 30));
        assert!(!outside_retention(now, now, 0));
        assert!(!outside_retention(edge, now, u32::MAX));
    }

    #[tokio::test]
    async fn expired_sample_is_still_acknowledged() {
        let (_dir, state) = state();
        let old = Utc::now() - chrono::Duration::days(90);
        ingest(&state, Sample::new("pc-001", old, 5.0, 5.0), Some("k"))
            .await
            .unwrap();
        assert_eq!(state.storage.query_metrics("pc-001", 10).unwrap().len(), 1);
    }
}
