use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_storage::StorageEngine;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageEngine>,
    pub config: Arc<ServerConfig>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageEngine>, config: ServerConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
            start_time: Utc::now(),
        }
    }

    /// Runs a blocking storage call on tokio's blocking pool.
    pub async fn with_storage<T, F>(&self, f: F) -> vigil_storage::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageEngine) -> vigil_storage::Result<T> + Send + 'static,
    {
        let storage = self.storage.clone();
        match tokio::task::spawn_blocking(move || f(storage.as_ref())).await {
            Ok(result) => result,
            Err(e) => Err(vigil_storage::StorageError::Other(format!(
                "storage task failed: {e}"
            ))),
        }
    }
}
