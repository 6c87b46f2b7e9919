use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vigil_agent::config::AgentConfig;
use vigil_agent::delivery::DeliveryEngine;
use vigil_agent::poller::CommandPoller;
use vigil_agent::runner::Agent;
use vigil_agent::spool::Spool;
use vigil_agent::transport::HttpTransport;
use vigil_collector::SystemSampler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        agent_id = %config.agent_id,
        server = %config.server_url,
        spool = %config.spool_path.display(),
        "vigil-agent starting"
    );

    let spool = Spool::open(&config.spool_path, config.spool_max_entries)?;
    let transport = Arc::new(HttpTransport::new(
        &config.server_url,
        config.api_key.clone(),
        config.request_timeout(),
    )?);

    let engine = DeliveryEngine::new(
        config.agent_id.clone(),
        Box::new(SystemSampler::new()),
        transport.clone(),
        spool,
        config.request_timeout(),
    );
    let poller = CommandPoller::new(transport, config.poll_timeout());
    let mut agent = Agent::new(&config, poller, engine);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = agent.run(shutdown).await {
        tracing::error!(error = %e, "Local spool failed, stopping agent");
        return Err(e.into());
    }
    Ok(())
}
