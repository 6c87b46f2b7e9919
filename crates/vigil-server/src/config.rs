use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Shared credential required for command writes and sample ingestion.
    /// Without one the server accepts unauthenticated writes.
    #[serde(default)]
    pub api_key: Option<String>,
    /// An agent counts as active when it delivered within this many seconds.
    #[serde(default = "default_agent_active_secs")]
    pub agent_active_secs: u64,
    /// Allowed CORS origins; empty allows any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_http_port() -> u16 {
    8000
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_agent_active_secs() -> u64 {
    180
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            retention_days: default_retention_days(),
            api_key: None,
            agent_active_secs: default_agent_active_secs(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read server config '{path}'"))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse server config '{path}'"))?
        } else {
            tracing::info!(path = %path, "Server config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(format!("VIGIL_{name}")).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HTTP_PORT") {
            self.http_port = v
                .parse()
                .with_context(|| format!("invalid VIGIL_HTTP_PORT '{v}'"))?;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api_key = Some(v);
        }
        // An empty key in the file or the environment means "no key"
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.api_key = None;
        }
        Ok(())
    }
}
