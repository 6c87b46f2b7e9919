use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "VIGIL_";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Agent identity; defaults to the host name.
    #[serde(default)]
    pub agent_id: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Credential sent with every delivery.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
    /// How often the control service is asked for the desired run-state.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_spool_path")]
    pub spool_path: PathBuf,
    /// Optional cap on undelivered samples kept on disk.
    #[serde(default)]
    pub spool_max_entries: Option<usize>,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    8
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_spool_path() -> PathBuf {
    PathBuf::from("data/buffer.jsonl")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            server_url: default_server_url(),
            api_key: None,
            collection_interval_secs: default_collection_interval(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            poll_timeout_secs: default_poll_timeout(),
            spool_path: default_spool_path(),
            spool_max_entries: None,
        }
    }
}

impl AgentConfig {
    /// Loads the TOML file at `path` (a missing file means all defaults),
    /// then applies `VIGIL_*` environment overrides and fills in the identity.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read agent config '{path}'"))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse agent config '{path}'"))?
        } else {
            tracing::info!(path = %path, "Agent config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())?;
        if config.agent_id.trim().is_empty() {
            config.agent_id =
                vigil_collector::host_name().unwrap_or_else(|| "unknown-host".to_string());
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name without the `VIGIL_` prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AGENT_ID") {
            self.agent_id = v;
        }
        if let Some(v) = lookup("SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("COLLECTION_INTERVAL_SECS") {
            self.collection_interval_secs = v
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}COLLECTION_INTERVAL_SECS '{v}'"))?;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}POLL_INTERVAL_SECS '{v}'"))?;
        }
        if let Some(v) = lookup("SPOOL_PATH") {
            self.spool_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collection_interval_secs == 0 {
            bail!("collection_interval_secs must be greater than zero");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 || self.poll_timeout_secs == 0 {
            bail!("request and poll timeouts must be greater than zero");
        }
        vigil_common::validation::validate_agent_id(&self.agent_id)
            .with_context(|| format!("invalid agent_id '{}'", self.agent_id))?;
        if self.poll_interval_secs >= self.collection_interval_secs {
            tracing::warn!(
                poll_interval_secs = self.poll_interval_secs,
                collection_interval_secs = self.collection_interval_secs,
                "Poll interval is not shorter than the collection interval; start/stop reactions will lag"
            );
        }
        Ok(())
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
