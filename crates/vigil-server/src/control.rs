//! Per-agent desired run-state.

use crate::auth::{check_credential, AuthError};
use crate::state::AppState;
use vigil_common::types::{CommandRecord, DesiredState};
use vigil_common::validation::{validate_agent_id, ValidationError};
use vigil_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Returns the stored command, or the stopped default for identities nobody
/// has issued a command for.
pub async fn read_command(state: &AppState, agent_id: &str) -> Result<CommandRecord, ControlError> {
    validate_agent_id(agent_id)?;
    let id = agent_id.to_string();
    let stored = state.with_storage(move |s| s.get_command(&id)).await?;
    Ok(stored.unwrap_or_else(|| CommandRecord::default_for(agent_id)))
}

/// Authenticates, validates and upserts a command. Nothing is written unless
/// every check passes.
pub async fn write_command(
    state: &AppState,
    agent_id: &str,
    command: &str,
    credential: Option<&str>,
) -> Result<CommandRecord, ControlError> {
    check_credential(state.config.api_key.as_deref(), credential)?;
    validate_agent_id(agent_id)?;
    let desired: DesiredState = command
        .parse()
        .map_err(|_| ValidationError::InvalidCommand(command.to_string()))?;

    let id = agent_id.to_string();
    let record = state
        .with_storage(move |s| s.set_command(&id, desired))
        .await?;
    tracing::info!(agent_id = %agent_id, command = %desired, "Command updated");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vigil_storage::engine::SqliteStorageEngine;

    fn state(api_key: Option<&str>) -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(SqliteStorageEngine::new(dir.path()).unwrap());
        let config = ServerConfig {
            api_key: api_key.map(str::to_string),
            ..ServerConfig::default()
        };
        (dir, AppState::new(storage, config))
    }

    #[tokio::test]
    async fn unknown_agent_reads_stop() {
        let (_dir, state) = state(None);
        let record = read_command(&state, "never-seen").await.unwrap();
        assert_eq!(record.desired_state, DesiredState::Stop);
        assert!(record.updated_at.is_none());
    }

    #[tokio::test]
    async fn write_then_read_returns_run() {
        let (_dir, state) = state(Some("k"));
        write_command(&state, "agent-1", "START", Some("k")).await.unwrap();
        let record = read_command(&state, "agent-1").await.unwrap();
        assert_eq!(record.desired_state, DesiredState::Run);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn rejected_writes_change_nothing() {
        let (_dir, state) = state(Some("k"));
        write_command(&state, "agent-1", "start", Some("k")).await.unwrap();

        let err = write_command(&state, "agent-1", "stop", Some("wrong")).await.unwrap_err();
        assert!(matches!(err, ControlError::Auth(AuthError::Invalid)));
        let err = write_command(&state, "agent-1", "stop", None).await.unwrap_err();
        assert!(matches!(err, ControlError::Auth(AuthError::Missing)));
        let err = write_command(&state, "agent-1", "pause", Some("k")).await.unwrap_err();
        assert!(matches!(err, ControlError::Validation(ValidationError::InvalidCommand(_))));

        let record = read_command(&state, "agent-1").await.unwrap();
        assert_eq!(record.desired_state, DesiredState::Run);
    }
}
