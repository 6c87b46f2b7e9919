use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;
use vigil_storage::engine::SqliteStorageEngine;
use vigil_storage::StorageEngine;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        retention_days = config.retention_days,
        "vigil-server starting"
    );
    if config.api_key.is_none() {
        tracing::warn!("No api_key configured: command writes and ingestion accept any caller");
    }

    let storage: Arc<dyn StorageEngine> =
        Arc::new(SqliteStorageEngine::new(Path::new(&config.data_dir))?);
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let retention_days = config.retention_days;
    let state = AppState::new(storage.clone(), config);

    // Periodic partition cleanup
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(CLEANUP_INTERVAL);
        loop {
            tick.tick().await;
            let storage = storage.clone();
            match tokio::task::spawn_blocking(move || storage.cleanup(retention_days)).await {
                Ok(Ok(removed)) if removed > 0 => {
                    tracing::info!(removed, "Cleaned up expired partitions")
                }
                Ok(Err(e)) => tracing::error!(error = %e, "Cleanup failed"),
                Err(e) => tracing::error!(error = %e, "Cleanup task panicked"),
                _ => {}
            }
        }
    });

    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;

    cleanup_handle.abort();
    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server error");
    }
    tracing::info!("Server stopped");
    result.map_err(Into::into)
}
