//! Network seams of the agent.
//!
//! The delivery engine and the command poller only see the [`SampleSink`] and
//! [`CommandSource`] traits; [`HttpTransport`] implements both against the
//! collector's HTTP API.

use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use vigil_common::types::{CommandResponse, DesiredState, Sample};

/// Accepts one sample for durable storage on the collector side.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn deliver(&self, sample: &Sample) -> Result<(), TransportError>;
}

/// Answers "what run-state should this agent be in right now".
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn fetch_command(&self, agent_id: &str) -> Result<DesiredState, TransportError>;
}

const API_KEY_HEADER: &str = "X-API-Key";

/// reqwest-backed client for `POST /collect` and `GET /command/{agent_id}`.
pub struct HttpTransport {
    client: reqwest::Client,
    base: reqwest::Url,
    api_key: Option<String>,
}

impl HttpTransport {
    /// `timeout` bounds every request end to end; callers may still wrap
    /// calls in their own, shorter deadline.
    pub fn new(
        server_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base = reqwest::Url::parse(server_url)
            .map_err(|e| anyhow::anyhow!("invalid server_url '{server_url}': {e}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("server_url '{server_url}' cannot be used as a base URL");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigil-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

async fn error_for_response(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("err_msg").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    TransportError::from_status(status, message)
}

#[async_trait]
impl SampleSink for HttpTransport {
    async fn deliver(&self, sample: &Sample) -> Result<(), TransportError> {
        let request = self.client.post(self.url(&["collect"])).json(sample);
        let response = self.authorize(request).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for_response(response).await)
        }
    }
}

#[async_trait]
impl CommandSource for HttpTransport {
    async fn fetch_command(&self, agent_id: &str) -> Result<DesiredState, TransportError> {
        let request = self.client.get(self.url(&["command", agent_id]));
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let body: CommandResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Transient(format!("unreadable command response: {e}")))?;
        Ok(body.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_segments_and_escapes_identity() {
        let transport =
            HttpTransport::new("http://collector:8000/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.url(&["command", "pc 1"]).as_str(),
            "http://collector:8000/command/pc%201"
        );

        let prefixed =
            HttpTransport::new("http://collector:8000/vigil", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            prefixed.url(&["collect"]).as_str(),
            "http://collector:8000/vigil/collect"
        );
    }

    #[test]
    fn rejects_unusable_server_url() {
        assert!(HttpTransport::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(HttpTransport::new("mailto:ops@example.com", None, Duration::from_secs(1)).is_err());
    }
}
